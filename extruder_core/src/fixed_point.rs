//! Integer arithmetic helpers for the control path.
//!
//! Temperatures are whole degrees Celsius in `i16`; intermediate products use
//! `i32`/`i64` so no step can overflow. Division truncates toward zero.

/// Scale `value` by `num / den`, truncating toward zero and saturating to `i16`.
#[inline]
pub fn scale_ratio_i16(value: i16, num: i32, den: i32) -> i16 {
    debug_assert!(den != 0, "scale_ratio_i16: zero denominator");
    let scaled = i64::from(value) * i64::from(num) / i64::from(den.max(1));
    saturate_i16(scaled)
}

/// Clamp an `i64` into the `i16` range.
#[inline]
pub fn saturate_i16(v: i64) -> i16 {
    v.clamp(i64::from(i16::MIN), i64::from(i16::MAX)) as i16
}

/// Truncating mean of a slice of raw readings. Empty input averages to 0.
#[inline]
pub fn mean_u16(values: &[u16]) -> u16 {
    if values.is_empty() {
        return 0;
    }
    let sum: u32 = values.iter().map(|&v| u32::from(v)).sum();
    (sum / values.len() as u32) as u16
}

/// Convert a controller output to an actuator duty: truncate toward zero,
/// then clamp to 0..=255. Non-finite output maps to 0.
#[inline]
pub fn duty_from_f32(output: f32) -> u8 {
    if !output.is_finite() {
        return 0;
    }
    output.trunc().clamp(0.0, 255.0) as u8
}
