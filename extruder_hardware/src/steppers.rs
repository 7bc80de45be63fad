//! Stand-in for the stepper engine.

use std::cell::Cell;

use extruder_traits::{BoxError, Motion, Point};

use crate::error::HwError;

/// Simulated stepper engine.
///
/// A move stays "running" for a number of `is_running` polls proportional to
/// its longest axis travel, so dispatcher tests and simulations see a move
/// take several slices.
#[derive(Debug)]
pub struct SimulatedSteppers {
    position: Point,
    target: Point,
    remaining_polls: Cell<u32>,
    steps_per_poll: u32,
    moves: u32,
}

impl SimulatedSteppers {
    /// `steps_per_poll` is how much travel one poll retires.
    pub fn new(steps_per_poll: u32) -> Self {
        Self {
            position: Point::default(),
            target: Point::default(),
            remaining_polls: Cell::new(0),
            steps_per_poll: steps_per_poll.max(1),
            moves: 0,
        }
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn target(&self) -> Point {
        self.target
    }

    /// Number of moves accepted so far.
    pub fn moves(&self) -> u32 {
        self.moves
    }
}

impl Default for SimulatedSteppers {
    fn default() -> Self {
        Self::new(100)
    }
}

impl Motion for SimulatedSteppers {
    fn is_running(&self) -> bool {
        let left = self.remaining_polls.get();
        if left == 0 {
            return false;
        }
        self.remaining_polls.set(left - 1);
        true
    }

    fn set_target(&mut self, target: Point, step_rate: i32) -> Result<(), BoxError> {
        if step_rate <= 0 {
            return Err(Box::new(HwError::Motion(format!(
                "step rate must be positive, got {step_rate}"
            ))));
        }
        let travel = [
            target.x.abs_diff(self.position.x),
            target.y.abs_diff(self.position.y),
            target.z.abs_diff(self.position.z),
        ]
        .into_iter()
        .max()
        .unwrap_or(0);
        self.remaining_polls.set(travel.div_ceil(self.steps_per_poll));
        self.target = target;
        // Position is reported at the target once accepted.
        self.position = target;
        self.moves = self.moves.saturating_add(1);
        tracing::debug!(?target, step_rate, travel, "simulated move accepted");
        Ok(())
    }

    fn define_position(&mut self, position: Point) -> Result<(), BoxError> {
        self.position = position;
        self.target = position;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_runs_for_travel_over_rate_polls() {
        let mut s = SimulatedSteppers::new(100);
        s.set_target(Point::new(250, 0, 0), 500).unwrap();
        assert!(s.is_running());
        assert!(s.is_running());
        assert!(s.is_running());
        assert!(!s.is_running());
    }

    #[test]
    fn define_position_is_instant() {
        let mut s = SimulatedSteppers::default();
        s.define_position(Point::new(5, 6, 7)).unwrap();
        assert!(!s.is_running());
        assert_eq!(s.position(), Point::new(5, 6, 7));
    }

    #[test]
    fn rejects_non_positive_rate() {
        let mut s = SimulatedSteppers::default();
        assert!(s.set_target(Point::new(1, 0, 0), 0).is_err());
        assert_eq!(s.moves(), 0);
    }
}
