//! Integer-only fixed-point primitives (gemmlowp semantics).

use crate::multiplier::QuantizedMultiplier;

/// Returns the high 32 bits of `2 × a × b`, rounded to nearest.
///
/// The single overflow case, `a == b == i32::MIN`, saturates to `i32::MAX`.
pub fn saturating_rounding_doubling_high_mul(a: i32, b: i32) -> i32 {
    if a == b && a == i32::MIN {
        return i32::MAX;
    }
    let ab = a as i64 * b as i64;
    let nudge = if ab >= 0 { 1i64 << 30 } else { 1 - (1i64 << 30) };
    ((ab + nudge) / (1i64 << 31)) as i32
}

/// Divides by `2^exponent`, rounding half away from zero.
///
/// `exponent` must lie in `0..=31`.
pub fn rounding_divide_by_pot(x: i32, exponent: i32) -> i32 {
    debug_assert!((0..=31).contains(&exponent));
    let exponent = exponent.clamp(0, 31);
    let mask = ((1i64 << exponent) - 1) as i32;
    let remainder = x & mask;
    let threshold = (mask >> 1) + (x < 0) as i32;
    (x >> exponent) + (remainder > threshold) as i32
}

/// Computes `round(x × real)` where `real` is encoded by `qm`, saturating on
/// overflow.
pub fn multiply_by_quantized_multiplier(x: i32, qm: QuantizedMultiplier) -> i32 {
    let left_shift = qm.shift.clamp(0, 31);
    let right_shift = (-qm.shift).clamp(0, 31);
    let shifted = ((x as i64) << left_shift).clamp(i32::MIN as i64, i32::MAX as i64) as i32;
    rounding_divide_by_pot(
        saturating_rounding_doubling_high_mul(shifted, qm.multiplier),
        right_shift,
    )
}
