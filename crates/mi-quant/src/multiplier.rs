use crate::error::{QuantError, Result};

/// A real multiplier encoded as a Q31 fixed-point mantissa and a power-of-two
/// exponent: `real ≈ multiplier × 2^(shift - 31)`.
///
/// Positive shifts are left shifts applied before the multiply, negative
/// shifts are rounding right shifts applied after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QuantizedMultiplier {
    pub multiplier: i32,
    pub shift: i32,
}

impl QuantizedMultiplier {
    /// The encoded value as a real number.
    pub fn to_real(&self) -> f64 {
        self.multiplier as f64 * 2f64.powi(self.shift - 31)
    }
}

/// Splits `x` into a mantissa in `[0.5, 1)` (sign preserved) and an exponent
/// such that `x = mantissa × 2^exponent`.
///
/// Zero, infinities and NaN are returned unchanged with a zero exponent.
pub fn frexp(x: f64) -> (f64, i32) {
    if x == 0.0 || !x.is_finite() {
        return (x, 0);
    }
    let bits = x.to_bits();
    let biased = ((bits >> 52) & 0x7ff) as i32;
    if biased == 0 {
        // Subnormal: scale into the normal range first.
        let (m, e) = frexp(x * 2f64.powi(54));
        return (m, e - 54);
    }
    let mantissa = f64::from_bits((bits & !(0x7ffu64 << 52)) | (1022u64 << 52));
    (mantissa, biased - 1022)
}

/// Decomposes a real multiplier into a Q31 mantissa and shift.
///
/// `0.0` maps to `(0, 0)`, as does any value so small that the shift would
/// drop below -31.
pub fn quantize_multiplier(real: f64) -> QuantizedMultiplier {
    if real == 0.0 {
        return QuantizedMultiplier::default();
    }
    let (q, mut shift) = frexp(real);
    let mut q_fixed = (q * (1i64 << 31) as f64).round() as i64;
    if q_fixed == 1i64 << 31 {
        q_fixed /= 2;
        shift += 1;
    }
    if shift < -31 {
        return QuantizedMultiplier::default();
    }
    QuantizedMultiplier {
        multiplier: q_fixed as i32,
        shift,
    }
}

/// Like [`quantize_multiplier`] for multipliers in `(0, 1)`; the shift is
/// never positive.
pub fn quantize_multiplier_smaller_than_one(real: f64) -> Result<QuantizedMultiplier> {
    if !(real > 0.0 && real < 1.0) {
        return Err(QuantError::MultiplierOutOfRange {
            value: real,
            range: "(0, 1)",
        });
    }
    let mut qm = quantize_multiplier(real);
    // Rounding can push the mantissa up to 1.0 and the shift to +1.
    if qm.shift > 0 {
        qm = QuantizedMultiplier {
            multiplier: i32::MAX,
            shift: 0,
        };
    }
    Ok(qm)
}

/// Like [`quantize_multiplier`] for multipliers greater than one; the shift
/// is never negative.
pub fn quantize_multiplier_greater_than_one(real: f64) -> Result<QuantizedMultiplier> {
    if !(real > 1.0 && real.is_finite()) {
        return Err(QuantError::MultiplierOutOfRange {
            value: real,
            range: "(1, inf)",
        });
    }
    Ok(quantize_multiplier(real))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_frexp() {
        assert_eq!(frexp(1.0), (0.5, 1));
        assert_eq!(frexp(0.75), (0.75, 0));
        assert_eq!(frexp(-8.0), (-0.5, 4));
        assert_eq!(frexp(0.0), (0.0, 0));
        let (m, e) = frexp(f64::MIN_POSITIVE / 4.0);
        assert_eq!(m, 0.5);
        assert_eq!(e, -1023);
    }

    #[test]
    fn test_zero_maps_to_zero() {
        assert_eq!(
            quantize_multiplier(0.0),
            QuantizedMultiplier {
                multiplier: 0,
                shift: 0
            }
        );
    }

    #[test]
    fn test_half() {
        let qm = quantize_multiplier(0.5);
        assert_eq!(qm.multiplier, 1 << 30);
        assert_eq!(qm.shift, 0);
    }

    #[test]
    fn test_tiny_multiplier_clamped() {
        assert_eq!(quantize_multiplier(1e-12), QuantizedMultiplier::default());
    }

    #[test]
    fn test_mantissa_rounding_carry() {
        // Just below 1.0: the mantissa rounds up to 2^31 and is renormalized.
        let qm = quantize_multiplier(1.0 - 1e-12);
        assert_eq!(qm.multiplier, 1 << 30);
        assert_eq!(qm.shift, 1);
    }

    #[test]
    fn test_smaller_than_one() {
        let qm = quantize_multiplier_smaller_than_one(0.3).unwrap();
        assert!(qm.shift <= 0);
        assert_relative_eq!(qm.to_real(), 0.3, max_relative = 1e-6);
        assert!(quantize_multiplier_smaller_than_one(1.5).is_err());
        assert!(quantize_multiplier_smaller_than_one(0.0).is_err());
    }

    #[test]
    fn test_greater_than_one() {
        let qm = quantize_multiplier_greater_than_one(3.5).unwrap();
        assert!(qm.shift >= 0);
        assert_relative_eq!(qm.to_real(), 3.5, max_relative = 1e-6);
        assert!(quantize_multiplier_greater_than_one(0.5).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Decomposition is accurate across many orders of magnitude.
        #[test]
        fn test_decomposition_accuracy(exp in -20i32..20, frac in 1.0f64..2.0) {
            let r = frac * 2f64.powi(exp);
            let qm = quantize_multiplier(r);
            let err = (qm.to_real() - r).abs() / r;
            prop_assert!(err < 1e-6, "r={} qm={:?} err={}", r, qm, err);
        }
    }
}
