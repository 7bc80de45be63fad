//! Test and helper mocks for extruder_core.

use std::cell::Cell;
use std::collections::HashMap;

use extruder_traits::{AnalogInput, BoxError, CalibrationStore, DutyOutput, Motion, Point};

/// Analog input returning a settable value per pin (or one value for all).
#[derive(Debug, Clone, Default)]
pub struct FixedAnalog {
    default: u16,
    per_pin: HashMap<u8, u16>,
    fail: bool,
}

impl FixedAnalog {
    pub fn new(raw: u16) -> Self {
        Self {
            default: raw,
            ..Self::default()
        }
    }

    pub fn set(&mut self, raw: u16) {
        self.default = raw;
    }

    pub fn set_pin(&mut self, pin: u8, raw: u16) {
        self.per_pin.insert(pin, raw);
    }

    pub fn set_failing(&mut self, fail: bool) {
        self.fail = fail;
    }
}

impl AnalogInput for FixedAnalog {
    fn read_raw(&mut self, pin: u8) -> Result<u16, BoxError> {
        if self.fail {
            return Err(Box::new(std::io::Error::other("adc offline")));
        }
        Ok(self.per_pin.get(&pin).copied().unwrap_or(self.default))
    }
}

/// Duty output that records every successful write. Writes to a pin in
/// `failing` are rejected and not recorded.
#[derive(Debug, Clone, Default)]
pub struct RecordingOutput {
    pub writes: Vec<(u8, u8)>,
    pub failing: Vec<u8>,
}

impl RecordingOutput {
    pub fn last(&self) -> Option<(u8, u8)> {
        self.writes.last().copied()
    }

    /// Most recent duty written to `pin`.
    pub fn last_on(&self, pin: u8) -> Option<u8> {
        self.writes
            .iter()
            .rev()
            .find(|(p, _)| *p == pin)
            .map(|&(_, duty)| duty)
    }
}

impl DutyOutput for RecordingOutput {
    fn write_duty(&mut self, pin: u8, duty: u8) -> Result<(), BoxError> {
        if self.failing.contains(&pin) {
            return Err(Box::new(std::io::Error::other("heater driver offline")));
        }
        self.writes.push((pin, duty));
        Ok(())
    }
}

/// Duty output that discards writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullOutput;

impl DutyOutput for NullOutput {
    fn write_duty(&mut self, _pin: u8, _duty: u8) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Motion stand-in: a move stays running for `polls_per_move` polls of
/// `is_running`.
#[derive(Debug, Default)]
pub struct ScriptedMotion {
    pub polls_per_move: u32,
    remaining: Cell<u32>,
    pub targets: Vec<(Point, i32)>,
    pub positions: Vec<Point>,
    pub fail_next: bool,
}

impl ScriptedMotion {
    pub fn new(polls_per_move: u32) -> Self {
        Self {
            polls_per_move,
            ..Self::default()
        }
    }
}

impl Motion for ScriptedMotion {
    fn is_running(&self) -> bool {
        let left = self.remaining.get();
        if left == 0 {
            return false;
        }
        self.remaining.set(left - 1);
        true
    }

    fn set_target(&mut self, target: Point, step_rate: i32) -> Result<(), BoxError> {
        if std::mem::take(&mut self.fail_next) {
            return Err(Box::new(std::io::Error::other("planner full")));
        }
        self.targets.push((target, step_rate));
        self.remaining.set(self.polls_per_move);
        Ok(())
    }

    fn define_position(&mut self, position: Point) -> Result<(), BoxError> {
        if std::mem::take(&mut self.fail_next) {
            return Err(Box::new(std::io::Error::other("planner busy")));
        }
        self.positions.push(position);
        Ok(())
    }
}

/// Calibration storage backed by a map of offset to entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: HashMap<u16, Vec<(i16, i16)>>,
}

impl MemoryStore {
    pub fn with_table(offset: u16, entries: Vec<(i16, i16)>) -> Self {
        let mut tables = HashMap::new();
        tables.insert(offset, entries);
        Self { tables }
    }
}

impl CalibrationStore for MemoryStore {
    fn read_table_entry(&self, offset: u16, index: u16) -> Result<(i16, i16), BoxError> {
        self.tables
            .get(&offset)
            .and_then(|t| t.get(usize::from(index)).copied())
            .ok_or_else(|| format!("no entry {index} at offset {offset}").into())
    }
}
