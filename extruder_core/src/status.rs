//! Outcomes returned from each heater tick.

use crate::error::SensorFault;

/// What one `manage_temperature` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaterStatus {
    /// Called before the update interval elapsed; nothing sampled or written.
    Skipped,
    /// Sampled and wrote `duty` to the heater.
    Driven { celsius: i16, duty: u8 },
    /// Sensor fault latched; the heater was driven to 0.
    Faulted(SensorFault),
}

impl HeaterStatus {
    pub fn fired(&self) -> bool {
        !matches!(self, HeaterStatus::Skipped)
    }
}
