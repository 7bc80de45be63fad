//! One-shot timeout on a wrapping `u32` tick counter.
//!
//! Unit-agnostic: the caller picks the clock (µs for DELAY, ms for tool waits)
//! and must pass ticks from that same clock to every call.

/// A deadline measured from a start tick.
///
/// An inactive timeout reports elapsed, so a dispatcher that never armed one
/// never waits on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timeout {
    start: u32,
    duration: u32,
    active: bool,
}

impl Timeout {
    pub const fn new() -> Self {
        Self {
            start: 0,
            duration: 0,
            active: false,
        }
    }

    /// Arm the timeout to elapse `duration` ticks after `now`.
    pub fn start(&mut self, now: u32, duration: u32) {
        self.start = now;
        self.duration = duration;
        self.active = true;
    }

    pub fn has_elapsed(&self, now: u32) -> bool {
        !self.active || crate::util::interval_elapsed(now, self.start, self.duration)
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn clear(&mut self) {
        self.active = false;
    }

    /// Ticks left before the deadline, 0 when inactive or elapsed.
    pub fn remaining(&self, now: u32) -> u32 {
        if self.has_elapsed(now) {
            0
        } else {
            self.duration - now.wrapping_sub(self.start)
        }
    }
}
