//! Fused activation functions and their clamp ranges.

use mi_tensor::{DType, QuantParams};

use crate::affine::quantize;
use crate::error::{QuantError, Result};

/// Activation fused into the tail of an arithmetic, convolution or
/// fully-connected operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FusedActivation {
    #[default]
    None,
    Relu,
    ReluN1To1,
    Relu6,
    Tanh,
}

impl FusedActivation {
    /// Maps the flatbuffer `ActivationFunctionType` code.
    pub fn from_tflite(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Relu),
            2 => Some(Self::ReluN1To1),
            3 => Some(Self::Relu6),
            4 => Some(Self::Tanh),
            _ => None,
        }
    }

    /// Clamp range for float kernels. `Tanh` is not a clamp and reports the
    /// unbounded range.
    pub fn range_f32(self) -> ActivationRange<f32> {
        match self {
            Self::None | Self::Tanh => ActivationRange::new(f32::NEG_INFINITY, f32::INFINITY),
            Self::Relu => ActivationRange::new(0.0, f32::INFINITY),
            Self::ReluN1To1 => ActivationRange::new(-1.0, 1.0),
            Self::Relu6 => ActivationRange::new(0.0, 6.0),
        }
    }

    /// Applies the activation to a float value.
    pub fn apply(self, x: f32) -> f32 {
        match self {
            Self::Tanh => x.tanh(),
            _ => self.range_f32().clamp(x),
        }
    }

    /// Clamp range in the quantized domain of an output with `params`,
    /// intersected with the range of `dtype`.
    ///
    /// # Errors
    ///
    /// `Tanh` has no quantized clamp and yields `UnsupportedActivation`;
    /// a non-integer `dtype` yields `NotAnIntegerType`.
    pub fn range_quantized(self, dtype: DType, params: QuantParams) -> Result<ActivationRange<i32>> {
        let (lo, hi) = dtype
            .integer_range()
            .ok_or(QuantError::NotAnIntegerType(dtype))?;
        let lo = lo.max(i32::MIN as i64) as i32;
        let hi = hi.min(i32::MAX as i64) as i32;
        let q = |v: f32| quantize(v, params, dtype);
        let range = match self {
            Self::None => ActivationRange::new(lo, hi),
            Self::Relu => ActivationRange::new(q(0.0)?.max(lo), hi),
            Self::Relu6 => ActivationRange::new(q(0.0)?.max(lo), q(6.0)?.min(hi)),
            Self::ReluN1To1 => ActivationRange::new(q(-1.0)?.max(lo), q(1.0)?.min(hi)),
            Self::Tanh => return Err(QuantError::UnsupportedActivation(self)),
        };
        Ok(range)
    }
}

/// Inclusive `[min, max]` clamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivationRange<T> {
    pub min: T,
    pub max: T,
}

impl<T: PartialOrd + Copy> ActivationRange<T> {
    pub fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, x: T) -> T {
        if x < self.min {
            self.min
        } else if x > self.max {
            self.max
        } else {
            x
        }
    }
}
