//! Affine mapping between real values and quantized integers:
//! `real = scale × (q - zero_point)`.

use mi_tensor::{DType, QuantParams};

use crate::error::{QuantError, Result};

/// Quantizes `value` into `dtype`, rounding half away from zero and
/// saturating to the type's range.
///
/// # Errors
///
/// Returns `NotAnIntegerType` if `dtype` has no integer range.
pub fn quantize(value: f32, params: QuantParams, dtype: DType) -> Result<i32> {
    let (lo, hi) = dtype
        .integer_range()
        .ok_or(QuantError::NotAnIntegerType(dtype))?;
    let (lo, hi) = (lo.max(i32::MIN as i64), hi.min(i32::MAX as i64));
    let scaled = (value as f64 / params.scale as f64).round() + params.zero_point as f64;
    // NaN saturates to the zero point.
    if scaled.is_nan() {
        return Ok((params.zero_point as i64).clamp(lo, hi) as i32);
    }
    Ok(scaled.clamp(lo as f64, hi as f64) as i32)
}

pub fn dequantize(q: i32, params: QuantParams) -> f32 {
    params.scale * (q - params.zero_point) as f32
}
