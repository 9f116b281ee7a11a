//! `mi-tensor` - Tensor data model for the micro-interpreter.
//!
//! This crate provides:
//! - Element types (`DType`) and the `Element` trait over their Rust counterparts
//! - `Shape` with NumPy-style broadcasting
//! - Quantization records (per-tensor and per-channel)
//! - Immutable `TensorDescriptor` metadata
//! - 8-byte aligned byte buffers (`AlignedBuf`) and owned `Tensor` values

pub mod descriptor;
pub mod dtype;
pub mod element;
pub mod error;
pub mod quant;
pub mod shape;
pub mod storage;
pub mod tensor;

// Re-export primary types at the crate root for convenience.
pub use descriptor::TensorDescriptor;
pub use dtype::DType;
pub use element::{cast_slice, cast_slice_mut, Element};
pub use error::{Result, TensorError};
pub use quant::{PerChannelParams, QuantParams, Quantization};
pub use shape::{Shape, MAX_RANK};
pub use storage::{AlignedBuf, SharedBuffer};
pub use tensor::Tensor;
