//! Analog-to-temperature sampling pipeline.
//!
//! Each update takes `SAMPLES_PER_READ` consecutive conversions and averages
//! them. Thermistor channels then push that value into a `SampleRing`, average
//! the whole window and interpolate the calibration table; thermocouples scale
//! the burst average linearly.

use eyre::WrapErr;

use extruder_traits::{AnalogInput, CalibrationStore};

use crate::error::{BuildError, Result};
use crate::fixed_point::{mean_u16, saturate_i16};
use crate::hw_error::map_hw_error;

/// Conversions averaged per update.
pub const SAMPLES_PER_READ: usize = 5;
/// Full-scale value of the 10-bit converter.
pub const ADC_MAX: u16 = 1023;
/// Number of distinct converter codes.
pub const ADC_RANGE: i32 = 1024;
/// Thermocouple amplifier full scale in degrees at the 5 V reference.
pub const THERMOCOUPLE_FULL_SCALE_C: i32 = 500;

/// Read `pin` `count` times and return the truncated mean.
pub fn sample_raw<A: AnalogInput + ?Sized>(analog: &mut A, pin: u8, count: usize) -> Result<u16> {
    let count = count.max(1);
    let mut sum: u64 = 0;
    for _ in 0..count {
        let raw = analog
            .read_raw(pin)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err_with(|| format!("reading analog pin {pin}"))?;
        sum += u64::from(raw);
    }
    Ok((sum / count as u64) as u16)
}

/// Fixed-size history of raw readings.
///
/// Starts zero-filled; `push` writes at the cursor and then advances it, and
/// `average` always covers all `N` slots.
#[derive(Debug, Clone)]
pub struct SampleRing<const N: usize = 4> {
    slots: [u16; N],
    next: usize,
}

impl<const N: usize> SampleRing<N> {
    const NON_EMPTY: () = assert!(N > 0, "SampleRing needs at least one slot");

    pub fn new() -> Self {
        let () = Self::NON_EMPTY;
        Self {
            slots: [0; N],
            next: 0,
        }
    }

    pub fn push(&mut self, raw: u16) {
        self.slots[self.next] = raw;
        self.next = (self.next + 1) % N;
    }

    pub fn average(&self) -> u16 {
        mean_u16(&self.slots)
    }

    /// Index the next `push` writes to.
    pub fn cursor(&self) -> usize {
        self.next
    }

    pub fn slots(&self) -> &[u16; N] {
        &self.slots
    }
}

impl<const N: usize> Default for SampleRing<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Evenly spaced `(raw, celsius)` breakpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThermistorTable {
    entries: Vec<(i16, i16)>,
    step: i32,
}

impl ThermistorTable {
    /// Read `len` entries starting at `offset` from calibration storage.
    pub fn load<S: CalibrationStore + ?Sized>(store: &S, offset: u16, len: u16) -> Result<Self> {
        let mut entries = Vec::with_capacity(usize::from(len));
        for index in 0..len {
            let entry = store
                .read_table_entry(offset, index)
                .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
                .wrap_err_with(|| format!("loading thermistor entry {index} at offset {offset}"))?;
            entries.push(entry);
        }
        let table = Self::from_entries(entries)?;
        tracing::debug!(offset, len, step = table.step, "thermistor table loaded");
        Ok(table)
    }

    pub fn from_entries(entries: Vec<(i16, i16)>) -> std::result::Result<Self, BuildError> {
        if entries.len() < 2 {
            return Err(BuildError::InvalidTable(format!(
                "need at least 2 entries, got {}",
                entries.len()
            )));
        }
        let step = i32::from(entries[1].0) - i32::from(entries[0].0);
        if step <= 0 {
            return Err(BuildError::InvalidTable(
                "raw values must be strictly increasing".into(),
            ));
        }
        for (i, pair) in entries.windows(2).enumerate() {
            let d = i32::from(pair[1].0) - i32::from(pair[0].0);
            if d <= 0 {
                return Err(BuildError::InvalidTable(format!(
                    "raw values must be strictly increasing (entry {})",
                    i + 1
                )));
            }
            if d != step {
                return Err(BuildError::InvalidTable(format!(
                    "raw values must be evenly spaced: step {step}, entry {} has {d}",
                    i + 1
                )));
            }
        }
        Ok(Self { entries, step })
    }

    pub fn entries(&self) -> &[(i16, i16)] {
        &self.entries
    }

    pub fn step(&self) -> i32 {
        self.step
    }

    /// Temperature for an averaged raw reading.
    ///
    /// Readings at or beyond either end clamp to that end's temperature.
    /// Inside the table the bracket is found by index arithmetic and the
    /// result is linearly interpolated with truncating integer division.
    pub fn interpolate(&self, raw: u16) -> i16 {
        let raw = i32::from(raw);
        let (first_raw, first_c) = self.entries[0];
        let (last_raw, last_c) = self.entries[self.entries.len() - 1];
        if raw <= i32::from(first_raw) {
            return first_c;
        }
        if raw >= i32::from(last_raw) {
            return last_c;
        }
        let idx = ((raw - i32::from(first_raw)) / self.step) as usize;
        let (raw_floor, t_floor) = self.entries[idx];
        let (_, t_ceil) = self.entries[idx + 1];
        let span = i64::from(t_ceil) - i64::from(t_floor);
        let offset = i64::from(raw - i32::from(raw_floor));
        saturate_i16(i64::from(t_floor) + offset * span / i64::from(self.step))
    }
}

/// One processed sensor update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    /// Averaged raw value the temperature was derived from.
    pub raw: u16,
    pub celsius: i16,
}

/// A thermistor on an analog pin with a smoothing ring.
#[derive(Debug, Clone)]
pub struct ThermistorChannel<const N: usize = 4> {
    pin: u8,
    table: ThermistorTable,
    ring: SampleRing<N>,
    last: Option<Reading>,
}

impl<const N: usize> ThermistorChannel<N> {
    pub fn new(pin: u8, table: ThermistorTable) -> Self {
        Self {
            pin,
            table,
            ring: SampleRing::new(),
            last: None,
        }
    }

    pub fn update<A: AnalogInput + ?Sized>(&mut self, analog: &mut A) -> Result<Reading> {
        let burst = sample_raw(analog, self.pin, SAMPLES_PER_READ)?;
        self.ring.push(burst);
        let raw = self.ring.average();
        let reading = Reading {
            raw,
            celsius: self.table.interpolate(raw),
        };
        tracing::trace!(pin = self.pin, burst, raw, celsius = reading.celsius, "thermistor");
        self.last = Some(reading);
        Ok(reading)
    }

    pub fn pin(&self) -> u8 {
        self.pin
    }

    pub fn table(&self) -> &ThermistorTable {
        &self.table
    }

    pub fn ring(&self) -> &SampleRing<N> {
        &self.ring
    }

    pub fn last(&self) -> Option<Reading> {
        self.last
    }
}

/// Amplified thermocouple: 10 mV/C into a 5 V, 10-bit converter.
#[derive(Debug, Clone)]
pub struct Thermocouple {
    pin: u8,
    last: Option<Reading>,
}

impl Thermocouple {
    pub fn new(pin: u8) -> Self {
        Self { pin, last: None }
    }

    /// `raw * 500 / 1024`, truncated.
    pub fn scale(raw: u16) -> i16 {
        (i32::from(raw) * THERMOCOUPLE_FULL_SCALE_C / ADC_RANGE) as i16
    }

    pub fn update<A: AnalogInput + ?Sized>(&mut self, analog: &mut A) -> Result<Reading> {
        let raw = sample_raw(analog, self.pin, SAMPLES_PER_READ)?;
        let reading = Reading {
            raw,
            celsius: Self::scale(raw),
        };
        tracing::trace!(pin = self.pin, raw, celsius = reading.celsius, "thermocouple");
        self.last = Some(reading);
        Ok(reading)
    }

    pub fn pin(&self) -> u8 {
        self.pin
    }

    pub fn last(&self) -> Option<Reading> {
        self.last
    }
}

/// The sensor a heater zone reads.
#[derive(Debug, Clone)]
pub enum Sensor {
    Thermistor(ThermistorChannel),
    Thermocouple(Thermocouple),
}

impl Sensor {
    pub fn update<A: AnalogInput + ?Sized>(&mut self, analog: &mut A) -> Result<Reading> {
        match self {
            Sensor::Thermistor(ch) => ch.update(analog),
            Sensor::Thermocouple(tc) => tc.update(analog),
        }
    }

    pub fn pin(&self) -> u8 {
        match self {
            Sensor::Thermistor(ch) => ch.pin(),
            Sensor::Thermocouple(tc) => tc.pin(),
        }
    }

    pub fn last(&self) -> Option<Reading> {
        match self {
            Sensor::Thermistor(ch) => ch.last(),
            Sensor::Thermocouple(tc) => tc.last(),
        }
    }
}
