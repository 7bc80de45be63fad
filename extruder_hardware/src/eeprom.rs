//! Byte-image calibration storage.

use extruder_traits::{BoxError, CalibrationStore};

use crate::error::HwError;

/// In-memory image of non-volatile storage holding thermistor tables.
///
/// Each table entry is 4 bytes: little-endian i16 raw value, then
/// little-endian i16 temperature.
#[derive(Debug, Clone, Default)]
pub struct EepromImage {
    bytes: Vec<u8>,
}

impl EepromImage {
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0xFF; size],
        }
    }

    /// Copy `data` into the image at `offset`, growing it when needed.
    pub fn write(&mut self, offset: u16, data: &[u8]) {
        let start = usize::from(offset);
        let end = start + data.len();
        if self.bytes.len() < end {
            self.bytes.resize(end, 0xFF);
        }
        self.bytes[start..end].copy_from_slice(data);
    }

    /// Write `(raw, celsius)` pairs as a table at `offset`.
    pub fn write_table(&mut self, offset: u16, entries: &[(i16, i16)]) {
        let mut buf = Vec::with_capacity(entries.len() * 4);
        for (raw, celsius) in entries {
            buf.extend_from_slice(&raw.to_le_bytes());
            buf.extend_from_slice(&celsius.to_le_bytes());
        }
        self.write(offset, &buf);
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn read_word(&self, addr: usize) -> Option<i16> {
        let lo = *self.bytes.get(addr)?;
        let hi = *self.bytes.get(addr + 1)?;
        Some(i16::from_le_bytes([lo, hi]))
    }
}

impl CalibrationStore for EepromImage {
    fn read_table_entry(&self, offset: u16, index: u16) -> Result<(i16, i16), BoxError> {
        let addr = usize::from(offset) + 4 * usize::from(index);
        match (self.read_word(addr), self.read_word(addr + 2)) {
            (Some(raw), Some(celsius)) => Ok((raw, celsius)),
            _ => Err(Box::new(HwError::StorageOutOfRange { offset, index })),
        }
    }
}
