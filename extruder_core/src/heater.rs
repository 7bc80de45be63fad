//! One heater zone: setpoint, sensor, control law and fault latch.

use std::sync::Arc;

use eyre::WrapErr;

use extruder_traits::{AnalogInput, Clock, DutyOutput};

use crate::config::SafetyCfg;
use crate::control::{ControlInput, ControlStrategy};
use crate::error::{Result, SensorFault};
use crate::fixed_point::scale_ratio_i16;
use crate::hw_error::map_hw_error;
use crate::sampler::{ADC_MAX, Reading, Sensor};
use crate::status::HeaterStatus;
use crate::util::interval_elapsed;

/// An independently controlled heating element.
///
/// Build with [`crate::builder::HeaterZoneBuilder`].
pub struct HeaterZone {
    pub(crate) name: String,
    pub(crate) tool: u8,
    pub(crate) sensor: Sensor,
    pub(crate) output_pin: u8,
    pub(crate) enabled: bool,
    pub(crate) current: i16,
    pub(crate) target: i16,
    pub(crate) max: i16,
    pub(crate) strategy: Box<dyn ControlStrategy>,
    pub(crate) update_interval_ms: u32,
    pub(crate) last_update_ms: Option<u32>,
    pub(crate) last_duty: u8,
    pub(crate) fault: Option<SensorFault>,
    pub(crate) safety: SafetyCfg,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
}

impl core::fmt::Debug for HeaterZone {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HeaterZone")
            .field("name", &self.name)
            .field("tool", &self.tool)
            .field("enabled", &self.enabled)
            .field("current", &self.current)
            .field("target", &self.target)
            .field("max", &self.max)
            .field("strategy", &self.strategy.name())
            .field("last_duty", &self.last_duty)
            .field("fault", &self.fault)
            .finish()
    }
}

impl HeaterZone {
    /// Set the target; the overheat ceiling follows at 110% of it.
    pub fn set_target_temperature(&mut self, celsius: i16) {
        self.target = celsius;
        self.max = scale_ratio_i16(celsius, 11, 10);
        tracing::debug!(zone = %self.name, target = celsius, max = self.max, "target set");
    }

    /// True once the current temperature is above 95% of the target.
    pub fn has_reached_target(&self) -> bool {
        self.current > scale_ratio_i16(self.target, 95, 100)
    }

    /// Periodic control tick.
    ///
    /// Does nothing until `update_interval_ms` has passed since the last fired
    /// tick. A fired tick samples the sensor, checks plausibility, computes a
    /// duty and writes it.
    pub fn manage_temperature<A, O>(&mut self, analog: &mut A, output: &mut O) -> Result<HeaterStatus>
    where
        A: AnalogInput + ?Sized,
        O: DutyOutput + ?Sized,
    {
        let now = self.clock.millis();
        if let Some(last) = self.last_update_ms {
            if !interval_elapsed(now, last, self.update_interval_ms) {
                return Ok(HeaterStatus::Skipped);
            }
        }
        self.last_update_ms = Some(now);

        match self.sensor.update(analog) {
            Ok(reading) => {
                self.current = reading.celsius;
                if let Some(fault) = self.judge(reading) {
                    self.latch(fault);
                }
            }
            Err(e) => self.latch(SensorFault::ReadFailed(format!("{e:#}"))),
        }

        if let Some(fault) = self.fault.clone() {
            self.write(output, 0)?;
            return Ok(HeaterStatus::Faulted(fault));
        }

        let duty = if self.enabled {
            self.strategy.compute(ControlInput {
                current: self.current,
                target: self.target,
                max: self.max,
            })
        } else {
            self.strategy.observe(self.current);
            0
        };
        self.write(output, duty)?;
        tracing::trace!(zone = %self.name, celsius = self.current, duty, "heater tick");
        Ok(HeaterStatus::Driven {
            celsius: self.current,
            duty,
        })
    }

    fn judge(&self, reading: Reading) -> Option<SensorFault> {
        if self.safety.fault_on_saturated_adc && (reading.raw == 0 || reading.raw >= ADC_MAX) {
            return Some(SensorFault::Saturated { raw: reading.raw });
        }
        if reading.celsius < self.safety.min_plausible_c
            || reading.celsius > self.safety.max_plausible_c
        {
            return Some(SensorFault::Implausible {
                celsius: reading.celsius,
            });
        }
        None
    }

    fn latch(&mut self, fault: SensorFault) {
        if self.fault.is_none() {
            tracing::warn!(zone = %self.name, %fault, "sensor fault latched, heater off");
            self.fault = Some(fault);
        }
    }

    fn write<O: DutyOutput + ?Sized>(&mut self, output: &mut O, duty: u8) -> Result<()> {
        output
            .write_duty(self.output_pin, duty)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err_with(|| format!("driving heater '{}'", self.name))?;
        self.last_duty = duty;
        Ok(())
    }

    /// Release a latched sensor fault and restart the control law from rest.
    pub fn clear_fault(&mut self) {
        if self.fault.take().is_some() {
            tracing::info!(zone = %self.name, "sensor fault cleared");
            self.strategy.reset();
        }
    }

    pub fn fault(&self) -> Option<&SensorFault> {
        self.fault.as_ref()
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn current_temperature(&self) -> i16 {
        self.current
    }

    pub fn target_temperature(&self) -> i16 {
        self.target
    }

    pub fn max_temperature(&self) -> i16 {
        self.max
    }

    pub fn last_duty(&self) -> u8 {
        self.last_duty
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tool(&self) -> u8 {
        self.tool
    }

    pub fn sensor(&self) -> &Sensor {
        &self.sensor
    }

    pub fn output_pin(&self) -> u8 {
        self.output_pin
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }
}
