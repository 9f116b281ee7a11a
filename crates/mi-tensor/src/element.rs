use std::fmt::Debug;

use half::f16;

use crate::dtype::DType;
use crate::error::{Result, TensorError};

/// A Rust type that can be viewed in place inside a tensor's byte buffer.
///
/// The set of implementors is closed and mirrors [`DType`]. `u8` also serves
/// as the element type of `Bool` tensors.
pub trait Element: bytemuck::Pod + PartialOrd + Default + Debug + Send + Sync + 'static {
    /// The dtype this element type is stored as.
    const DTYPE: DType;

    /// Returns true if buffers of `dtype` may be viewed as `Self`.
    fn accepts(dtype: DType) -> bool {
        dtype == Self::DTYPE
    }
}

impl Element for f32 {
    const DTYPE: DType = DType::F32;
}

impl Element for f16 {
    const DTYPE: DType = DType::F16;
}

impl Element for i8 {
    const DTYPE: DType = DType::I8;
}

impl Element for i16 {
    const DTYPE: DType = DType::I16;
}

impl Element for i32 {
    const DTYPE: DType = DType::I32;
}

impl Element for i64 {
    const DTYPE: DType = DType::I64;
}

impl Element for u8 {
    const DTYPE: DType = DType::U8;

    fn accepts(dtype: DType) -> bool {
        matches!(dtype, DType::U8 | DType::Bool)
    }
}

/// Views a byte slice as a slice of `T`.
///
/// # Errors
/// Returns `BadCast` if the slice is misaligned for `T` or its length is not
/// a multiple of `size_of::<T>()`.
pub fn cast_slice<T: Element>(bytes: &[u8]) -> Result<&[T]> {
    if bytes.is_empty() {
        return Ok(&[]);
    }
    bytemuck::try_cast_slice(bytes).map_err(|e| TensorError::BadCast {
        dtype: T::DTYPE,
        len: bytes.len(),
        reason: format!("{:?}", e),
    })
}

/// Views a mutable byte slice as a mutable slice of `T`.
pub fn cast_slice_mut<T: Element>(bytes: &mut [u8]) -> Result<&mut [T]> {
    let len = bytes.len();
    if len == 0 {
        return Ok(&mut []);
    }
    bytemuck::try_cast_slice_mut(bytes).map_err(|e| TensorError::BadCast {
        dtype: T::DTYPE,
        len,
        reason: format!("{:?}", e),
    })
}
