use thiserror::Error;

/// Why a heater zone stopped trusting its sensor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SensorFault {
    #[error("sensor read failed: {0}")]
    ReadFailed(String),
    #[error("sensor saturated at raw {raw}")]
    Saturated { raw: u16 },
    #[error("implausible temperature {celsius} C")]
    Implausible { celsius: i16 },
}

/// Problems found in the command byte stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolFault {
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),
    #[error("payload for opcode {opcode} stalled for {waited_ms} ms")]
    PayloadStalled { opcode: u8, waited_ms: u32 },
    #[error("command queue overflow: capacity {capacity}, attempted {attempted}")]
    QueueOverflow { capacity: usize, attempted: usize },
}

#[derive(Debug, Error, Clone)]
pub enum ControlError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("sensor fault: {0}")]
    Sensor(#[from] SensorFault),
    #[error("protocol fault: {0}")]
    Protocol(#[from] ProtocolFault),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid state: {0}")]
    State(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing sensor")]
    MissingSensor,
    #[error("missing pins")]
    MissingPins,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    #[error("invalid thermistor table: {0}")]
    InvalidTable(String),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
