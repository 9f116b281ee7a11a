use thiserror::Error;

use mi_tensor::DType;

use crate::activation::FusedActivation;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuantError {
    #[error("multiplier {value} is outside the range {range}")]
    MultiplierOutOfRange { value: f64, range: &'static str },
    #[error("tensor is missing per-tensor quantization parameters")]
    MissingQuantization,
    #[error("{0} has no integer range to clamp to")]
    NotAnIntegerType(DType),
    #[error("per-channel table length mismatch: expected {expected}, got {got}")]
    ChannelCount { expected: usize, got: usize },
    #[error("activation {0:?} has no quantized implementation")]
    UnsupportedActivation(FusedActivation),
}

pub type Result<T> = std::result::Result<T, QuantError>;
