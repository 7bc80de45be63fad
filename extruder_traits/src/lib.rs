//! Contracts between the extruder control core and the hardware around it.
//!
//! Every fallible method returns a boxed error so drivers can surface their
//! own error types; the core maps them into typed errors at the boundary.

pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Axis position in steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

/// Analog input sampling (ADC).
pub trait AnalogInput {
    fn read_raw(&mut self, pin: u8) -> Result<u16, BoxError>;
}

/// Actuator drive, e.g. a heater PWM channel. Duty is 0..=255.
pub trait DutyOutput {
    fn write_duty(&mut self, pin: u8, duty: u8) -> Result<(), BoxError>;
}

/// Non-volatile calibration table storage.
///
/// Returns the `(raw, celsius)` breakpoint at `index` of the table stored at
/// `offset`.
pub trait CalibrationStore {
    fn read_table_entry(&self, offset: u16, index: u16) -> Result<(i16, i16), BoxError>;
}

/// The stepper motion engine.
pub trait Motion {
    fn is_running(&self) -> bool;
    fn set_target(&mut self, target: Point, step_rate: i32) -> Result<(), BoxError>;
    fn define_position(&mut self, position: Point) -> Result<(), BoxError>;
}

impl<T: AnalogInput + ?Sized> AnalogInput for Box<T> {
    fn read_raw(&mut self, pin: u8) -> Result<u16, BoxError> {
        (**self).read_raw(pin)
    }
}

impl<T: DutyOutput + ?Sized> DutyOutput for Box<T> {
    fn write_duty(&mut self, pin: u8, duty: u8) -> Result<(), BoxError> {
        (**self).write_duty(pin, duty)
    }
}

impl<T: Motion + ?Sized> Motion for Box<T> {
    fn is_running(&self) -> bool {
        (**self).is_running()
    }
    fn set_target(&mut self, target: Point, step_rate: i32) -> Result<(), BoxError> {
        (**self).set_target(target, step_rate)
    }
    fn define_position(&mut self, position: Point) -> Result<(), BoxError> {
        (**self).define_position(position)
    }
}
