use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Monotonic tick source for control and timing across the stack.
///
/// Ticks are free-running `u32` counters that wrap, the same shape a
/// microcontroller timer exposes. Always compare them with the wrapping
/// helpers below, never with `<`/`>` on raw values.
///
/// - micros(): microsecond ticks, wraps after ~71 minutes
/// - millis(): millisecond ticks, wraps after ~49 days
pub trait Clock {
    fn micros(&self) -> u32;
    fn millis(&self) -> u32;

    /// Microseconds elapsed since `since`, correct across one wraparound.
    fn us_since(&self, since: u32) -> u32 {
        self.micros().wrapping_sub(since)
    }

    /// Milliseconds elapsed since `since`, correct across one wraparound.
    fn ms_since(&self, since: u32) -> u32 {
        self.millis().wrapping_sub(since)
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn micros(&self) -> u32 {
        (**self).micros()
    }

    fn millis(&self) -> u32 {
        (**self).millis()
    }
}

/// Default, real-time clock backed by std::time::Instant.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn micros(&self) -> u32 {
        // Truncation is the wrap.
        self.origin.elapsed().as_micros() as u32
    }

    #[inline]
    fn millis(&self) -> u32 {
        self.origin.elapsed().as_millis() as u32
    }
}

/// Deterministic clock whose time only moves when told to.
///
/// Used by simulations and tests. Clones share the same time base, so a
/// handle kept by the driver loop advances every component holding a clone.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_us: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start at an absolute microsecond offset (useful to test wraparound).
    pub fn starting_at_us(us: u64) -> Self {
        Self {
            now_us: Arc::new(AtomicU64::new(us)),
        }
    }

    /// Advance the clock by the given number of microseconds.
    pub fn advance_us(&self, us: u64) {
        self.now_us.fetch_add(us, Ordering::Relaxed);
    }

    /// Advance the clock by the given number of milliseconds.
    pub fn advance_ms(&self, ms: u64) {
        self.advance_us(ms.saturating_mul(1_000));
    }

    /// Total elapsed microseconds without wrapping.
    pub fn elapsed_us(&self) -> u64 {
        self.now_us.load(Ordering::Relaxed)
    }
}

impl Clock for ManualClock {
    fn micros(&self) -> u32 {
        self.elapsed_us() as u32
    }

    fn millis(&self) -> u32 {
        (self.elapsed_us() / 1_000) as u32
    }
}
