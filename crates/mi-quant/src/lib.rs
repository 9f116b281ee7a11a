//! `mi-quant` - Quantization arithmetic for the micro-interpreter.
//!
//! Every quantized kernel goes through these helpers so rounding and
//! saturation behave identically across operators.

pub mod activation;
pub mod affine;
pub mod error;
pub mod fixed_point;
pub mod multiplier;
pub mod offsets;
pub mod per_channel;

pub use activation::{ActivationRange, FusedActivation};
pub use affine::{dequantize, quantize};
pub use error::{QuantError, Result};
pub use fixed_point::{
    multiply_by_quantized_multiplier, rounding_divide_by_pot,
    saturating_rounding_doubling_high_mul,
};
pub use multiplier::{
    frexp, quantize_multiplier, quantize_multiplier_greater_than_one,
    quantize_multiplier_smaller_than_one, QuantizedMultiplier,
};
pub use offsets::{FilterOffset, InputOffset, OutputOffset};
pub use per_channel::PerChannelMultipliers;
