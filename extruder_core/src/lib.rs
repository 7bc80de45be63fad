#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::must_use_candidate
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Extruder control core (hardware-agnostic).
//!
//! All hardware is reached through the `extruder_traits` contracts:
//! `AnalogInput` and `DutyOutput` for heaters, `CalibrationStore` for
//! thermistor tables, `Motion` for the stepper engine and `Clock` for time.
//!
//! ## Architecture
//!
//! - **Sampling**: burst averaging, `SampleRing` smoothing, table
//!   interpolation and thermocouple scaling (`sampler`)
//! - **Heaters**: setpoint, debounce, PID / bang-bang strategies and the
//!   sensor fault latch (`heater`, `control`)
//! - **Commands**: bounded byte queue, tagged decode and the dispatcher
//!   state machine (`queue`, `dispatcher`, `timeout`)
//! - **Context**: one cooperative slice over all of the above (`runner`)
//!
//! Temperatures are whole degrees Celsius in `i16`. Ratios on them (the 110%
//! ceiling, the 95% reached threshold) use integer arithmetic that truncates
//! toward zero.

pub mod builder;
pub mod config;
pub mod control;
pub mod conversions;
pub mod dispatcher;
pub mod error;
pub mod fixed_point;
pub mod heater;
pub mod hw_error;
pub mod mocks;
pub mod queue;
pub mod runner;
pub mod sampler;
pub mod status;
pub mod timeout;
pub mod util;

pub use builder::{HeaterZoneBuilder, build_zones};
pub use config::{BangBangCfg, CommandsCfg, ControlCfg, ControlMode, PidCfg, SafetyCfg};
pub use control::{BangBangControl, ControlInput, ControlStrategy, PidControl};
pub use dispatcher::{Command, CommandDispatcher, Decode, Mode, SliceOutcome, ToolStatus, decode};
pub use error::{BuildError, ControlError, ProtocolFault, Result, SensorFault};
pub use heater::HeaterZone;
pub use queue::CommandQueue;
pub use runner::{ControlContext, SliceReport};
pub use sampler::{
    Reading, SampleRing, Sensor, ThermistorChannel, ThermistorTable, Thermocouple, sample_raw,
};
pub use status::HeaterStatus;
pub use timeout::Timeout;
