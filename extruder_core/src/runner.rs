//! Control context: owns every heater zone and the command dispatcher and
//! runs them in a fixed order each slice.

use std::sync::Arc;

use eyre::WrapErr;

use extruder_traits::{AnalogInput, CalibrationStore, Clock, DutyOutput, Motion};

use crate::builder::build_zones;
use crate::config::CommandsCfg;
use crate::dispatcher::{CommandDispatcher, SliceOutcome};
use crate::error::{ControlError, Result};
use crate::heater::HeaterZone;
use crate::status::HeaterStatus;

/// Everything one slice did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceReport {
    /// One entry per zone, in zone order.
    pub heaters: Vec<HeaterStatus>,
    pub commands: SliceOutcome,
}

pub struct ControlContext<M: Motion> {
    zones: Vec<HeaterZone>,
    dispatcher: CommandDispatcher<M>,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl<M: Motion> core::fmt::Debug for ControlContext<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ControlContext")
            .field("zones", &self.zones)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

impl<M: Motion> ControlContext<M> {
    pub fn new(
        zones: Vec<HeaterZone>,
        motion: M,
        commands: CommandsCfg,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        let dispatcher = CommandDispatcher::new(motion, commands, Arc::clone(&clock));
        Self {
            zones,
            dispatcher,
            clock,
        }
    }

    /// Build zones and dispatcher from a validated configuration.
    pub fn from_config<T: CalibrationStore + ?Sized>(
        cfg: &extruder_config::Config,
        store: &T,
        motion: M,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Result<Self> {
        let zones = build_zones(cfg, store, Arc::clone(&clock))?;
        Ok(Self::new(zones, motion, (&cfg.commands).into(), clock))
    }

    /// Heater ticks first (they keep running while commands are paused), then
    /// one dispatcher slice with the zones answering tool readiness.
    ///
    /// A zone whose tick fails does not stop the others or the dispatcher; the
    /// first error is returned once the whole slice has run.
    pub fn run_slice<A, O>(&mut self, analog: &mut A, output: &mut O) -> Result<SliceReport>
    where
        A: AnalogInput + ?Sized,
        O: DutyOutput + ?Sized,
    {
        let (heaters, heater_err) = self.tick_zones(analog, output);
        let commands = self.run_command_slice();
        if let Some(err) = heater_err {
            return Err(err);
        }
        Ok(SliceReport {
            heaters,
            commands: commands?,
        })
    }

    /// One control tick per zone, in zone order. Every zone is ticked even when
    /// an earlier one fails; the first error is returned afterwards.
    pub fn manage_temperatures<A, O>(
        &mut self,
        analog: &mut A,
        output: &mut O,
    ) -> Result<Vec<HeaterStatus>>
    where
        A: AnalogInput + ?Sized,
        O: DutyOutput + ?Sized,
    {
        match self.tick_zones(analog, output) {
            (_, Some(err)) => Err(err),
            (heaters, None) => Ok(heaters),
        }
    }

    pub fn run_command_slice(&mut self) -> Result<SliceOutcome> {
        self.dispatcher.run_slice(self.zones.as_slice())
    }

    fn tick_zones<A, O>(
        &mut self,
        analog: &mut A,
        output: &mut O,
    ) -> (Vec<HeaterStatus>, Option<eyre::Report>)
    where
        A: AnalogInput + ?Sized,
        O: DutyOutput + ?Sized,
    {
        let mut heaters = Vec::with_capacity(self.zones.len());
        let mut first_err = None;
        for zone in &mut self.zones {
            match zone.manage_temperature(analog, output) {
                Ok(status) => heaters.push(status),
                Err(err) => {
                    tracing::warn!(
                        zone = %zone.name(),
                        error = %format!("{err:#}"),
                        "heater tick failed"
                    );
                    first_err.get_or_insert(err);
                }
            }
        }
        (heaters, first_err)
    }

    fn zone_mut(&mut self, index: usize) -> Result<&mut HeaterZone> {
        let count = self.zones.len();
        self.zones
            .get_mut(index)
            .ok_or_else(|| {
                eyre::Report::new(ControlError::State(format!(
                    "no zone {index} ({count} configured)"
                )))
            })
    }

    pub fn set_target_temperature(&mut self, zone: usize, celsius: i16) -> Result<()> {
        self.zone_mut(zone)
            .wrap_err("setting target temperature")?
            .set_target_temperature(celsius);
        Ok(())
    }

    /// False for an unknown zone.
    pub fn has_reached_target(&self, zone: usize) -> bool {
        self.zones
            .get(zone)
            .is_some_and(HeaterZone::has_reached_target)
    }

    pub fn pause_commands(&mut self, paused: bool) {
        self.dispatcher.pause(paused);
    }

    pub fn is_command_thread_paused(&self) -> bool {
        self.dispatcher.is_paused()
    }

    pub fn reset_commands(&mut self) {
        self.dispatcher.reset();
    }

    pub fn zone(&self, index: usize) -> Option<&HeaterZone> {
        self.zones.get(index)
    }

    pub fn zones(&self) -> &[HeaterZone] {
        &self.zones
    }

    pub fn zones_mut(&mut self) -> &mut [HeaterZone] {
        &mut self.zones
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<M> {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut CommandDispatcher<M> {
        &mut self.dispatcher
    }

    pub fn clock(&self) -> &Arc<dyn Clock + Send + Sync> {
        &self.clock
    }
}
