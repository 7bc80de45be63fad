//! Common time helpers for extruder_core.

/// Number of milliseconds in one second.
pub const MILLIS_PER_SEC: u32 = 1_000;

/// Convert whole seconds to milliseconds, saturating at `u32::MAX`.
#[inline]
pub fn secs_to_ms(secs: u32) -> u32 {
    secs.saturating_mul(MILLIS_PER_SEC)
}

/// True once `interval` ticks have passed since `last`, using wrapping
/// subtraction so the answer survives counter rollover.
#[inline]
pub fn interval_elapsed(now: u32, last: u32, interval: u32) -> bool {
    now.wrapping_sub(last) >= interval
}
