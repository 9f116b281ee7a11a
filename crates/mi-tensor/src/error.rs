use thiserror::Error;

use crate::dtype::DType;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TensorError {
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },
    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch { expected: DType, got: DType },
    #[error("cannot broadcast shapes {a:?} and {b:?}")]
    BroadcastError { a: Vec<usize>, b: Vec<usize> },
    #[error("rank {rank} exceeds the maximum of {max}")]
    RankTooLarge { rank: usize, max: usize },
    #[error("invalid axis {axis} for tensor with {ndim} dimensions")]
    InvalidAxis { axis: usize, ndim: usize },
    #[error("invalid quantization: {0}")]
    InvalidQuantization(String),
    #[error("buffer length mismatch: expected {expected} bytes, got {got}")]
    BufferLength { expected: usize, got: usize },
    #[error("cannot view {len} bytes as {dtype}: {reason}")]
    BadCast {
        dtype: DType,
        len: usize,
        reason: String,
    },
    #[error("failed to allocate {bytes} bytes")]
    AllocationFailure { bytes: usize },
    #[error("unsupported dtype: {0}")]
    UnsupportedDType(String),
}

pub type Result<T> = std::result::Result<T, TensorError>;
