//! Type-state builder for `HeaterZone` and config-driven zone construction.
//!
//! The builder enforces at compile time that a sensor and an output pin are
//! provided before `build()` is available. `try_build()` is always available
//! for dynamic checks.

use std::marker::PhantomData;
use std::sync::Arc;

use eyre::WrapErr;

use extruder_traits::{CalibrationStore, Clock, MonotonicClock};

use crate::config::{ControlCfg, ControlMode, SafetyCfg};
use crate::control::strategy_for;
use crate::error::{BuildError, Result};
use crate::heater::HeaterZone;
use crate::sampler::{Sensor, ThermistorChannel, ThermistorTable, Thermocouple};

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

pub struct HeaterZoneBuilder<S, P> {
    name: String,
    tool: u8,
    sensor: Option<Sensor>,
    output_pin: Option<u8>,
    control: Option<ControlCfg>,
    safety: Option<SafetyCfg>,
    enabled: bool,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    _s: PhantomData<S>,
    _p: PhantomData<P>,
}

impl HeaterZoneBuilder<Missing, Missing> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tool: 0,
            sensor: None,
            output_pin: None,
            control: None,
            safety: None,
            enabled: true,
            clock: None,
            _s: PhantomData,
            _p: PhantomData,
        }
    }
}

fn validate(control: &ControlCfg, safety: &SafetyCfg) -> std::result::Result<(), BuildError> {
    if control.update_interval_ms == 0 {
        return Err(BuildError::InvalidConfig("update_interval_ms must be >= 1"));
    }
    match &control.mode {
        ControlMode::Pid(pid) => {
            for v in [pid.kp, pid.ki, pid.kd, pid.integral_drive_max] {
                if !v.is_finite() {
                    return Err(BuildError::InvalidConfig("pid gains must be finite"));
                }
                if v < 0.0 {
                    return Err(BuildError::InvalidConfig("pid gains must be >= 0"));
                }
            }
        }
        ControlMode::BangBang(bb) => {
            if bb.low_duty > bb.high_duty {
                return Err(BuildError::InvalidConfig("low_duty must be <= high_duty"));
            }
        }
    }
    if safety.min_plausible_c >= safety.max_plausible_c {
        return Err(BuildError::InvalidConfig(
            "min_plausible_c must be < max_plausible_c",
        ));
    }
    Ok(())
}

impl<S, P> HeaterZoneBuilder<S, P> {
    /// Fallible build available in any type-state; returns detailed error for missing pieces.
    pub fn try_build(self) -> Result<HeaterZone> {
        let sensor = self
            .sensor
            .ok_or_else(|| eyre::Report::new(BuildError::MissingSensor))?;
        let output_pin = self
            .output_pin
            .ok_or_else(|| eyre::Report::new(BuildError::MissingPins))?;
        if sensor.pin() == output_pin {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "input and output pins must differ",
            )));
        }
        let control = self.control.unwrap_or_default();
        let safety = self.safety.unwrap_or_default();
        validate(&control, &safety)?;

        let clock: Arc<dyn Clock + Send + Sync> = match self.clock {
            Some(c) => c,
            None => Arc::new(MonotonicClock::new()),
        };

        Ok(HeaterZone {
            name: self.name,
            tool: self.tool,
            sensor,
            output_pin,
            enabled: self.enabled,
            current: 0,
            target: 0,
            max: 0,
            strategy: strategy_for(&control.mode),
            update_interval_ms: control.update_interval_ms,
            last_update_ms: None,
            last_duty: 0,
            fault: None,
            safety,
            clock,
        })
    }

    pub fn with_tool(mut self, tool: u8) -> Self {
        self.tool = tool;
        self
    }
    pub fn with_control(mut self, control: ControlCfg) -> Self {
        self.control = Some(control);
        self
    }
    pub fn with_safety(mut self, safety: SafetyCfg) -> Self {
        self.safety = Some(safety);
        self
    }
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
    /// Provide a clock; defaults to `MonotonicClock` when not provided.
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
}

// Setters that advance type-state
impl<P> HeaterZoneBuilder<Missing, P> {
    pub fn with_sensor(self, sensor: Sensor) -> HeaterZoneBuilder<Set, P> {
        HeaterZoneBuilder {
            name: self.name,
            tool: self.tool,
            sensor: Some(sensor),
            output_pin: self.output_pin,
            control: self.control,
            safety: self.safety,
            enabled: self.enabled,
            clock: self.clock,
            _s: PhantomData,
            _p: PhantomData,
        }
    }
}

impl<S> HeaterZoneBuilder<S, Missing> {
    pub fn with_output_pin(self, pin: u8) -> HeaterZoneBuilder<S, Set> {
        HeaterZoneBuilder {
            name: self.name,
            tool: self.tool,
            sensor: self.sensor,
            output_pin: Some(pin),
            control: self.control,
            safety: self.safety,
            enabled: self.enabled,
            clock: self.clock,
            _s: PhantomData,
            _p: PhantomData,
        }
    }
}

impl HeaterZoneBuilder<Set, Set> {
    /// Validate and build. Only available when sensor and output pin are set.
    pub fn build(self) -> Result<HeaterZone> {
        self.try_build()
    }
}

/// Build every configured zone, loading thermistor tables from `store`.
pub fn build_zones<T: CalibrationStore + ?Sized>(
    cfg: &extruder_config::Config,
    store: &T,
    clock: Arc<dyn Clock + Send + Sync>,
) -> Result<Vec<HeaterZone>> {
    let control = ControlCfg::from(&cfg.control);
    let safety = SafetyCfg::from(&cfg.safety);
    cfg.zones
        .iter()
        .map(|z| {
            let sensor = match z.sensor {
                extruder_config::SensorKind::Thermistor => {
                    let table = ThermistorTable::load(store, z.table_offset, z.table_len)
                        .wrap_err_with(|| format!("zone '{}'", z.name))?;
                    Sensor::Thermistor(ThermistorChannel::new(z.input_pin, table))
                }
                extruder_config::SensorKind::Thermocouple => {
                    Sensor::Thermocouple(Thermocouple::new(z.input_pin))
                }
            };
            HeaterZoneBuilder::new(z.name.clone())
                .with_tool(z.tool)
                .with_sensor(sensor)
                .with_output_pin(z.output_pin)
                .with_control(control)
                .with_safety(safety)
                .enabled(!z.disabled)
                .with_clock(Arc::clone(&clock))
                .build()
                .wrap_err_with(|| format!("building zone '{}'", z.name))
        })
        .collect()
}
