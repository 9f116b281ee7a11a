use thiserror::Error;

use mi_quant::{FusedActivation, QuantError};
use mi_tensor::{DType, TensorError};

use crate::graph::OpCode;

/// Coarse classification of every runtime failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TypeMismatch,
    ShapeMismatch,
    UnsupportedType,
    MissingBuffer,
    AllocationFailure,
    InvariantViolation,
    /// A While loop exceeded `RuntimeConfig::max_while_iterations`.
    IterationLimit,
}

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("tensor {tensor}: expected {expected}, got {got}")]
    TypeMismatch {
        tensor: usize,
        expected: DType,
        got: DType,
    },
    #[error("quantization mismatch: {0}")]
    QuantizationMismatch(String),
    #[error("tensor {tensor}: shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        tensor: usize,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("invalid shape: {0}")]
    InvalidShape(String),
    #[error("{op} does not support element type {dtype}")]
    UnsupportedType { op: OpCode, dtype: DType },
    #[error("{op} does not support fused activation {activation:?}")]
    UnsupportedActivation {
        op: OpCode,
        activation: FusedActivation,
    },
    #[error("no kernel registered for {0}")]
    UnregisteredOp(OpCode),
    #[error("unknown builtin operator code {0}")]
    UnknownOpCode(u32),
    #[error("tensor {tensor} has no bound data")]
    MissingBuffer { tensor: usize },
    #[error("{op} is missing required tensor at position {position}")]
    MissingTensor { op: OpCode, position: usize },
    #[error("failed to allocate {bytes} bytes")]
    AllocationFailure { bytes: usize },
    #[error("arena of {required} bytes exceeds the limit of {limit} bytes")]
    ArenaLimitExceeded { required: usize, limit: usize },
    #[error("dynamic tensor {tensor} needs {bytes} bytes, limit is {limit}")]
    DynamicLimitExceeded {
        tensor: usize,
        bytes: usize,
        limit: usize,
    },
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    #[error("while loop exceeded {limit} iterations")]
    IterationLimit { limit: u32 },
    #[error("interpreter is poisoned; configure it again")]
    Poisoned,
    #[error("subgraph {subgraph}, operator {index} ({op}): {source}")]
    Operator {
        subgraph: usize,
        index: usize,
        op: OpCode,
        source: Box<RuntimeError>,
    },
    #[error("tensor error: {0}")]
    Tensor(#[from] TensorError),
    #[error("quantization error: {0}")]
    Quant(#[from] QuantError),
}

impl RuntimeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RuntimeError::TypeMismatch { .. } | RuntimeError::QuantizationMismatch(_) => {
                ErrorKind::TypeMismatch
            }
            RuntimeError::ShapeMismatch { .. } | RuntimeError::InvalidShape(_) => {
                ErrorKind::ShapeMismatch
            }
            RuntimeError::UnsupportedType { .. }
            | RuntimeError::UnsupportedActivation { .. }
            | RuntimeError::UnregisteredOp(_)
            | RuntimeError::UnknownOpCode(_) => ErrorKind::UnsupportedType,
            RuntimeError::MissingBuffer { .. } => ErrorKind::MissingBuffer,
            RuntimeError::AllocationFailure { .. }
            | RuntimeError::ArenaLimitExceeded { .. }
            | RuntimeError::DynamicLimitExceeded { .. } => ErrorKind::AllocationFailure,
            RuntimeError::MissingTensor { .. }
            | RuntimeError::InvariantViolation(_)
            | RuntimeError::Poisoned => ErrorKind::InvariantViolation,
            RuntimeError::IterationLimit { .. } => ErrorKind::IterationLimit,
            RuntimeError::Operator { source, .. } => source.kind(),
            RuntimeError::Tensor(e) => tensor_error_kind(e),
            RuntimeError::Quant(e) => quant_error_kind(e),
        }
    }

    /// The innermost error, unwrapping operator location context.
    pub fn root(&self) -> &RuntimeError {
        match self {
            RuntimeError::Operator { source, .. } => source.root(),
            other => other,
        }
    }

    pub(crate) fn invariant(msg: impl Into<String>) -> Self {
        RuntimeError::InvariantViolation(msg.into())
    }
}

fn tensor_error_kind(e: &TensorError) -> ErrorKind {
    match e {
        TensorError::ShapeMismatch { .. }
        | TensorError::BroadcastError { .. }
        | TensorError::RankTooLarge { .. }
        | TensorError::InvalidAxis { .. }
        | TensorError::BufferLength { .. } => ErrorKind::ShapeMismatch,
        TensorError::DTypeMismatch { .. }
        | TensorError::InvalidQuantization(_)
        | TensorError::BadCast { .. } => ErrorKind::TypeMismatch,
        TensorError::AllocationFailure { .. } => ErrorKind::AllocationFailure,
        TensorError::UnsupportedDType(_) => ErrorKind::UnsupportedType,
    }
}

fn quant_error_kind(e: &QuantError) -> ErrorKind {
    match e {
        QuantError::MultiplierOutOfRange { .. } | QuantError::MissingQuantization => {
            ErrorKind::TypeMismatch
        }
        QuantError::NotAnIntegerType(_) | QuantError::UnsupportedActivation(_) => {
            ErrorKind::UnsupportedType
        }
        QuantError::ChannelCount { .. } => ErrorKind::ShapeMismatch,
    }
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
