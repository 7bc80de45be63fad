//! `From` implementations bridging `extruder_config` types to `extruder_core` types.

use crate::config::{BangBangCfg, CommandsCfg, ControlCfg, ControlMode, PidCfg, SafetyCfg};
use crate::error::BuildError;
use crate::sampler::ThermistorTable;

// ── Control ──────────────────────────────────────────────────────────────────

impl From<&extruder_config::PidCfg> for PidCfg {
    fn from(c: &extruder_config::PidCfg) -> Self {
        Self {
            kp: c.kp,
            ki: c.ki,
            kd: c.kd,
            integral_drive_max: c.integral_drive_max,
        }
    }
}

impl From<&extruder_config::BangBangCfg> for BangBangCfg {
    fn from(c: &extruder_config::BangBangCfg) -> Self {
        Self {
            high_duty: c.high_duty,
            low_duty: c.low_duty,
        }
    }
}

impl From<&extruder_config::ControlCfg> for ControlCfg {
    fn from(c: &extruder_config::ControlCfg) -> Self {
        let mode = match c.mode {
            extruder_config::ControlMode::Pid => ControlMode::Pid((&c.pid).into()),
            extruder_config::ControlMode::BangBang => ControlMode::BangBang((&c.bang_bang).into()),
        };
        Self {
            mode,
            update_interval_ms: c.update_interval_ms,
        }
    }
}

// ── Safety / commands ────────────────────────────────────────────────────────

impl From<&extruder_config::Safety> for SafetyCfg {
    fn from(c: &extruder_config::Safety) -> Self {
        Self {
            min_plausible_c: c.min_plausible_c,
            max_plausible_c: c.max_plausible_c,
            fault_on_saturated_adc: c.fault_on_saturated_adc,
        }
    }
}

impl From<&extruder_config::CommandsCfg> for CommandsCfg {
    fn from(c: &extruder_config::CommandsCfg) -> Self {
        Self {
            queue_capacity: c.queue_capacity,
            incomplete_timeout_ms: c.incomplete_timeout_ms,
        }
    }
}

// ── Thermistor table ─────────────────────────────────────────────────────────

impl TryFrom<&extruder_config::ThermistorTable> for ThermistorTable {
    type Error = BuildError;

    fn try_from(t: &extruder_config::ThermistorTable) -> Result<Self, Self::Error> {
        ThermistorTable::from_entries(t.rows().iter().map(|r| (r.raw, r.celsius)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bang_bang_mode_maps_duties() {
        let mut c = extruder_config::ControlCfg::default();
        c.mode = extruder_config::ControlMode::BangBang;
        c.bang_bang.low_duty = 40;
        let rt = ControlCfg::from(&c);
        assert_eq!(
            rt.mode,
            ControlMode::BangBang(BangBangCfg {
                high_duty: 255,
                low_duty: 40
            })
        );
    }

    #[test]
    fn default_table_converts() {
        let t = ThermistorTable::try_from(&extruder_config::default_thermistor_table()).unwrap();
        assert_eq!(t.step(), 53);
        assert_eq!(t.entries().len(), 20);
    }
}
