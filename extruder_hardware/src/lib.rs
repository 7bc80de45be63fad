//! Simulated extruder board: thermal plant, heater outputs, steppers and
//! calibration storage.
//!
//! The plant is shared between the analog and duty handles through
//! `Rc<RefCell<_>>`, so the control loop can own both halves while the
//! simulation advances time in between slices.

pub mod eeprom;
pub mod error;
pub mod steppers;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use extruder_traits::{AnalogInput, BoxError, DutyOutput};

pub use eeprom::EepromImage;
pub use error::HwError;
pub use steppers::SimulatedSteppers;

/// 10-bit converter full scale.
pub const ADC_MAX: u16 = 1023;

/// How a channel's temperature turns into a raw reading.
#[derive(Debug, Clone)]
pub enum SensorModel {
    /// `raw = celsius * 1024 / 500`.
    Thermocouple,
    /// Inverse of a `(raw, celsius)` table, sorted by raw.
    Thermistor(Vec<(i16, i16)>),
}

impl SensorModel {
    fn to_raw(&self, celsius: f32) -> u16 {
        let raw = match self {
            SensorModel::Thermocouple => celsius * 1024.0 / 500.0,
            SensorModel::Thermistor(rows) => inverse_lookup(rows, celsius),
        };
        raw.round().clamp(0.0, f32::from(ADC_MAX)) as u16
    }
}

fn inverse_lookup(rows: &[(i16, i16)], celsius: f32) -> f32 {
    let Some(&(first_raw, first_c)) = rows.first() else {
        return 0.0;
    };
    for pair in rows.windows(2) {
        let (r0, c0) = (f32::from(pair[0].0), f32::from(pair[0].1));
        let (r1, c1) = (f32::from(pair[1].0), f32::from(pair[1].1));
        let (lo, hi) = if c0 <= c1 { (c0, c1) } else { (c1, c0) };
        if celsius >= lo && celsius <= hi {
            if (c1 - c0).abs() < f32::EPSILON {
                return r0;
            }
            return r0 + (celsius - c0) * (r1 - r0) / (c1 - c0);
        }
    }
    // Off the table: pin to whichever end is nearer in temperature.
    let (last_raw, last_c) = rows[rows.len() - 1];
    if (celsius - f32::from(first_c)).abs() <= (celsius - f32::from(last_c)).abs() {
        f32::from(first_raw)
    } else {
        f32::from(last_raw)
    }
}

/// Physical constants of one heated block.
#[derive(Debug, Clone, Copy)]
pub struct ThermalParams {
    pub ambient_c: f32,
    /// Degrees per second gained at full duty.
    pub heat_rate_c_per_s: f32,
    /// Fraction of the excess over ambient lost per second.
    pub loss_per_s: f32,
}

impl Default for ThermalParams {
    fn default() -> Self {
        Self {
            ambient_c: 22.0,
            heat_rate_c_per_s: 4.0,
            loss_per_s: 0.01,
        }
    }
}

#[derive(Debug)]
struct Channel {
    output_pin: u8,
    model: SensorModel,
    params: ThermalParams,
    celsius: f32,
    duty: u8,
    forced_raw: Option<u16>,
    fail_reads: bool,
}

#[derive(Debug, Default)]
struct Plant {
    // keyed by analog input pin
    channels: BTreeMap<u8, Channel>,
    // output pin -> input pin
    outputs: BTreeMap<u8, u8>,
}

/// Builder and time source for the simulated board.
#[derive(Debug, Clone, Default)]
pub struct SimulatedBoard {
    plant: Rc<RefCell<Plant>>,
}

impl SimulatedBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a heated block read on `input_pin` and driven on `output_pin`.
    pub fn add_channel(
        &self,
        input_pin: u8,
        output_pin: u8,
        model: SensorModel,
        params: ThermalParams,
    ) {
        let mut plant = self.plant.borrow_mut();
        plant.outputs.insert(output_pin, input_pin);
        plant.channels.insert(
            input_pin,
            Channel {
                output_pin,
                model,
                params,
                celsius: params.ambient_c,
                duty: 0,
                forced_raw: None,
                fail_reads: false,
            },
        );
    }

    /// Handle implementing [`AnalogInput`].
    pub fn analog(&self) -> SimAnalog {
        SimAnalog {
            plant: Rc::clone(&self.plant),
        }
    }

    /// Handle implementing [`DutyOutput`].
    pub fn heaters(&self) -> SimHeaters {
        SimHeaters {
            plant: Rc::clone(&self.plant),
        }
    }

    /// Integrate every channel forward by `dt_ms`.
    pub fn advance_ms(&self, dt_ms: u32) {
        let dt = dt_ms as f32 / 1000.0;
        let mut plant = self.plant.borrow_mut();
        for ch in plant.channels.values_mut() {
            let p = ch.params;
            let gain = f32::from(ch.duty) / 255.0 * p.heat_rate_c_per_s;
            let loss = (ch.celsius - p.ambient_c) * p.loss_per_s;
            ch.celsius += (gain - loss) * dt;
        }
    }

    pub fn temperature(&self, input_pin: u8) -> Option<f32> {
        self.plant
            .borrow()
            .channels
            .get(&input_pin)
            .map(|c| c.celsius)
    }

    pub fn set_temperature(&self, input_pin: u8, celsius: f32) {
        if let Some(ch) = self.plant.borrow_mut().channels.get_mut(&input_pin) {
            ch.celsius = celsius;
        }
    }

    /// Last duty written to the block read on `input_pin`.
    pub fn duty(&self, input_pin: u8) -> Option<u8> {
        self.plant.borrow().channels.get(&input_pin).map(|c| c.duty)
    }

    /// Report `raw` regardless of temperature (e.g. an open sensor at 1023).
    pub fn force_raw(&self, input_pin: u8, raw: Option<u16>) {
        if let Some(ch) = self.plant.borrow_mut().channels.get_mut(&input_pin) {
            ch.forced_raw = raw;
        }
    }

    pub fn fail_reads(&self, input_pin: u8, fail: bool) {
        if let Some(ch) = self.plant.borrow_mut().channels.get_mut(&input_pin) {
            ch.fail_reads = fail;
        }
    }
}

/// Analog side of the simulated board.
#[derive(Debug, Clone)]
pub struct SimAnalog {
    plant: Rc<RefCell<Plant>>,
}

impl AnalogInput for SimAnalog {
    fn read_raw(&mut self, pin: u8) -> Result<u16, BoxError> {
        let plant = self.plant.borrow();
        let ch = plant
            .channels
            .get(&pin)
            .ok_or(HwError::UnknownAnalogPin(pin))?;
        if ch.fail_reads {
            tracing::warn!(pin, "simulated adc timeout");
            return Err(Box::new(HwError::Timeout(pin)));
        }
        Ok(ch
            .forced_raw
            .unwrap_or_else(|| ch.model.to_raw(ch.celsius)))
    }
}

/// Heater side of the simulated board.
#[derive(Debug, Clone)]
pub struct SimHeaters {
    plant: Rc<RefCell<Plant>>,
}

impl DutyOutput for SimHeaters {
    fn write_duty(&mut self, pin: u8, duty: u8) -> Result<(), BoxError> {
        let mut plant = self.plant.borrow_mut();
        let input = *plant
            .outputs
            .get(&pin)
            .ok_or(HwError::UnknownOutputPin(pin))?;
        if let Some(ch) = plant.channels.get_mut(&input) {
            debug_assert_eq!(ch.output_pin, pin);
            ch.duty = duty;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn table() -> Vec<(i16, i16)> {
        vec![(0, 300), (512, 150), (1024, 0)]
    }

    #[rstest]
    #[case(SensorModel::Thermocouple, 250.0, 512)]
    #[case(SensorModel::Thermocouple, 0.0, 0)]
    #[case(SensorModel::Thermocouple, 900.0, 1023)]
    #[case(SensorModel::Thermistor(table()), 150.0, 512)]
    #[case(SensorModel::Thermistor(table()), 225.0, 256)]
    #[case(SensorModel::Thermistor(table()), 400.0, 0)]
    fn raw_from_temperature(#[case] model: SensorModel, #[case] c: f32, #[case] raw: u16) {
        assert_eq!(model.to_raw(c), raw);
    }

    #[test]
    fn duty_heats_the_block() {
        let board = SimulatedBoard::new();
        board.add_channel(1, 2, SensorModel::Thermocouple, ThermalParams::default());
        let mut heaters = board.heaters();
        heaters.write_duty(2, 255).unwrap();
        board.advance_ms(10_000);
        let t = board.temperature(1).unwrap();
        assert!(t > 50.0, "temperature only reached {t}");
        assert_eq!(board.duty(1), Some(255));
    }

    #[test]
    fn idle_block_cools_toward_ambient() {
        let board = SimulatedBoard::new();
        board.add_channel(1, 2, SensorModel::Thermocouple, ThermalParams::default());
        board.set_temperature(1, 200.0);
        board.advance_ms(5_000);
        let t = board.temperature(1).unwrap();
        assert!(t < 200.0 && t > 22.0);
    }

    #[test]
    fn unknown_pins_error() {
        let board = SimulatedBoard::new();
        assert!(board.analog().read_raw(9).is_err());
        assert!(board.heaters().write_duty(9, 1).is_err());
    }

    #[test]
    fn injected_faults_surface() {
        let board = SimulatedBoard::new();
        board.add_channel(1, 2, SensorModel::Thermocouple, ThermalParams::default());
        let mut analog = board.analog();
        board.force_raw(1, Some(ADC_MAX));
        assert_eq!(analog.read_raw(1).unwrap(), ADC_MAX);
        board.force_raw(1, None);
        board.fail_reads(1, true);
        let err = analog.read_raw(1).unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }
}
