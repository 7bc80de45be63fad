use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("no analog channel on pin {0}")]
    UnknownAnalogPin(u8),
    #[error("no duty output on pin {0}")]
    UnknownOutputPin(u8),
    #[error("adc read timeout on pin {0}")]
    Timeout(u8),
    #[error("calibration storage read out of range: offset {offset}, index {index}")]
    StorageOutOfRange { offset: u16, index: u16 },
    #[error("motion rejected: {0}")]
    Motion(String),
}
