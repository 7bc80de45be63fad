//! Runtime configuration types for heater zones and the dispatcher.
//!
//! These are separate from the TOML-deserialized config in `extruder_config`;
//! see `conversions` for the mapping.

/// PID gains and the integral authority ceiling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidCfg {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Largest drive the integral term alone may contribute.
    pub integral_drive_max: f32,
}

impl Default for PidCfg {
    fn default() -> Self {
        Self {
            kp: 5.0,
            ki: 0.1,
            kd: 100.0,
            integral_drive_max: 110.0,
        }
    }
}

/// Three-level bang-bang duties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BangBangCfg {
    /// Below target.
    pub high_duty: u8,
    /// Between target and max.
    pub low_duty: u8,
}

impl Default for BangBangCfg {
    fn default() -> Self {
        Self {
            high_duty: 255,
            low_duty: 64,
        }
    }
}

/// Which control law drives a zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlMode {
    Pid(PidCfg),
    BangBang(BangBangCfg),
}

impl Default for ControlMode {
    fn default() -> Self {
        ControlMode::Pid(PidCfg::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlCfg {
    pub mode: ControlMode,
    /// Minimum milliseconds between fired control ticks.
    pub update_interval_ms: u32,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self {
            mode: ControlMode::default(),
            update_interval_ms: 200,
        }
    }
}

/// Sensor plausibility limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetyCfg {
    pub min_plausible_c: i16,
    pub max_plausible_c: i16,
    /// Treat a raw reading pinned at 0 or full scale as a broken sensor.
    pub fault_on_saturated_adc: bool,
}

impl Default for SafetyCfg {
    fn default() -> Self {
        Self {
            min_plausible_c: -20,
            max_plausible_c: 300,
            fault_on_saturated_adc: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandsCfg {
    pub queue_capacity: usize,
    /// 0 disables the incomplete-payload watchdog.
    pub incomplete_timeout_ms: u32,
}

impl Default for CommandsCfg {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            incomplete_timeout_ms: 0,
        }
    }
}
