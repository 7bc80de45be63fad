//! Control laws that turn a temperature sample into a heater duty.

use crate::config::{BangBangCfg, ControlMode, PidCfg};
use crate::fixed_point::duty_from_f32;

/// Largest duty an actuator accepts.
pub const DUTY_MAX: u8 = 255;

/// What a strategy sees on a fired tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlInput {
    pub current: i16,
    pub target: i16,
    pub max: i16,
}

pub trait ControlStrategy: Send + std::fmt::Debug {
    /// Compute the duty for this tick, updating internal state.
    fn compute(&mut self, input: ControlInput) -> u8;

    /// Record a sample without driving (zone disabled).
    fn observe(&mut self, _current: i16) {}

    /// Drop accumulated state.
    fn reset(&mut self);

    fn name(&self) -> &'static str;
}

/// Build the strategy selected by `mode`.
pub fn strategy_for(mode: &ControlMode) -> Box<dyn ControlStrategy> {
    match mode {
        ControlMode::Pid(cfg) => Box::new(PidControl::new(*cfg)),
        ControlMode::BangBang(cfg) => Box::new(BangBangControl::new(*cfg)),
    }
}

/// PID on temperature error with the derivative taken on the measurement.
///
/// The integral accumulator is bounded so that `ki * accumulator` can never
/// exceed `integral_drive_max` in either direction.
#[derive(Debug, Clone)]
pub struct PidControl {
    cfg: PidCfg,
    accumulator: f32,
    i_min: f32,
    i_max: f32,
    previous: i16,
}

impl PidControl {
    pub fn new(cfg: PidCfg) -> Self {
        // Symmetric and ordered whatever the sign of the drive ceiling.
        let bound = if cfg.ki > 0.0 {
            (cfg.integral_drive_max / cfg.ki).abs()
        } else {
            0.0
        };
        let bound = if bound.is_nan() { 0.0 } else { bound };
        let (i_min, i_max) = (-bound, bound);
        Self {
            cfg,
            accumulator: 0.0,
            i_min,
            i_max,
            previous: 0,
        }
    }

    pub fn accumulator(&self) -> f32 {
        self.accumulator
    }

    pub fn integral_bounds(&self) -> (f32, f32) {
        (self.i_min, self.i_max)
    }

    pub fn previous(&self) -> i16 {
        self.previous
    }

    pub fn gains(&self) -> &PidCfg {
        &self.cfg
    }
}

impl ControlStrategy for PidControl {
    fn compute(&mut self, input: ControlInput) -> u8 {
        let error = f32::from(input.target) - f32::from(input.current);
        let p = self.cfg.kp * error;

        self.accumulator = (self.accumulator + error).clamp(self.i_min, self.i_max);
        let i = self.cfg.ki * self.accumulator;

        let d = self.cfg.kd * (f32::from(input.current) - f32::from(self.previous));
        self.previous = input.current;

        duty_from_f32(p + i - d)
    }

    fn observe(&mut self, current: i16) {
        self.previous = current;
    }

    fn reset(&mut self) {
        self.accumulator = 0.0;
        self.previous = 0;
    }

    fn name(&self) -> &'static str {
        "pid"
    }
}

/// High below target, low up to max, off at or above max.
#[derive(Debug, Clone)]
pub struct BangBangControl {
    cfg: BangBangCfg,
}

impl BangBangControl {
    pub fn new(cfg: BangBangCfg) -> Self {
        Self { cfg }
    }
}

impl ControlStrategy for BangBangControl {
    fn compute(&mut self, input: ControlInput) -> u8 {
        if input.current < input.target {
            self.cfg.high_duty
        } else if input.current < input.max {
            self.cfg.low_duty
        } else {
            0
        }
    }

    fn reset(&mut self) {}

    fn name(&self) -> &'static str {
        "bang_bang"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn input(current: i16, target: i16) -> ControlInput {
        ControlInput {
            current,
            target,
            max: crate::fixed_point::scale_ratio_i16(target, 11, 10),
        }
    }

    #[rstest]
    #[case(150, 200, 255)]
    #[case(199, 200, 255)]
    #[case(200, 200, 64)]
    #[case(219, 200, 64)]
    #[case(220, 200, 0)]
    #[case(400, 200, 0)]
    fn bang_bang_bands(#[case] current: i16, #[case] target: i16, #[case] duty: u8) {
        let mut bb = BangBangControl::new(BangBangCfg::default());
        assert_eq!(bb.compute(input(current, target)), duty);
    }

    #[test]
    fn pid_first_tick_from_cold() {
        // error 10: P = 50, acc = 10 -> I = 1, D = 100 * (190 - 0)
        let mut pid = PidControl::new(PidCfg::default());
        assert_eq!(pid.compute(input(190, 200)), 0);
        assert_eq!(pid.previous(), 190);
        // Second tick, same sample: D = 0, acc = 20 -> I = 2, P = 50
        assert_eq!(pid.compute(input(190, 200)), 52);
    }

    #[test]
    fn pid_integral_is_bounded() {
        let mut pid = PidControl::new(PidCfg {
            kp: 0.0,
            ki: 0.5,
            kd: 0.0,
            integral_drive_max: 100.0,
        });
        for _ in 0..1_000 {
            pid.compute(input(0, 300));
        }
        assert_eq!(pid.accumulator(), 200.0);
        assert_eq!(pid.compute(input(0, 300)), 100);
    }

    #[test]
    fn pid_zero_ki_pins_accumulator() {
        let mut pid = PidControl::new(PidCfg {
            ki: 0.0,
            ..PidCfg::default()
        });
        pid.compute(input(20, 200));
        assert_eq!(pid.accumulator(), 0.0);
        assert_eq!(pid.integral_bounds(), (0.0, 0.0));
    }

    #[rstest]
    #[case(-100.0, (-200.0, 200.0))]
    #[case(f32::NAN, (0.0, 0.0))]
    fn pid_bounds_stay_ordered(#[case] drive_max: f32, #[case] bounds: (f32, f32)) {
        let mut pid = PidControl::new(PidCfg {
            kp: 0.0,
            ki: 0.5,
            kd: 0.0,
            integral_drive_max: drive_max,
        });
        assert_eq!(pid.integral_bounds(), bounds);
        for _ in 0..1_000 {
            pid.compute(input(0, 300));
        }
        assert_eq!(pid.accumulator(), bounds.1);
    }

    #[test]
    fn observe_updates_derivative_history() {
        let mut pid = PidControl::new(PidCfg::default());
        pid.observe(180);
        // D = 100 * (180 - 180) = 0; P = 100; I = 0.1 * 20 = 2
        assert_eq!(pid.compute(input(180, 200)), 102);
    }

    #[test]
    fn factory_picks_strategy() {
        assert_eq!(strategy_for(&ControlMode::default()).name(), "pid");
        let bb = strategy_for(&ControlMode::BangBang(BangBangCfg::default()));
        assert_eq!(bb.name(), "bang_bang");
    }
}
