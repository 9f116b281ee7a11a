use std::sync::Arc;

use crate::element::{cast_slice, cast_slice_mut, Element};
use crate::error::{Result, TensorError};

/// A read-only buffer that can be shared between tensors without copying.
pub type SharedBuffer = Arc<AlignedBuf>;

/// Heap byte buffer aligned to 8 bytes.
///
/// Backed by a `Vec<u64>`, so every element type in [`crate::DType`] can be
/// viewed in place at any 8-byte aligned offset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlignedBuf {
    words: Vec<u64>,
    len: usize,
}

impl AlignedBuf {
    /// Allocate `len` zeroed bytes.
    ///
    /// # Errors
    /// Returns `AllocationFailure` if the allocator cannot satisfy the request.
    pub fn zeroed(len: usize) -> Result<Self> {
        let n_words = len.div_ceil(8);
        let mut words = Vec::new();
        words
            .try_reserve_exact(n_words)
            .map_err(|_| TensorError::AllocationFailure { bytes: len })?;
        words.resize(n_words, 0);
        Ok(AlignedBuf { words, len })
    }

    /// Copy a byte slice into a new aligned buffer.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut buf = AlignedBuf::zeroed(bytes.len())?;
        buf.as_bytes_mut().copy_from_slice(bytes);
        Ok(buf)
    }

    /// Copy typed elements into a new aligned buffer.
    pub fn from_elements<T: Element>(data: &[T]) -> Result<Self> {
        AlignedBuf::from_bytes(bytemuck::cast_slice(data))
    }

    /// Number of bytes in this buffer.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u64, u8>(&self.words)[..self.len]
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        let len = self.len;
        &mut bytemuck::cast_slice_mut::<u64, u8>(&mut self.words)[..len]
    }

    /// Returns the data as a slice of `T`.
    ///
    /// # Errors
    /// Returns an error if the byte length is not a multiple of `size_of::<T>()`.
    pub fn as_slice<T: Element>(&self) -> Result<&[T]> {
        cast_slice(self.as_bytes())
    }

    /// Returns the data as a mutable slice of `T`.
    pub fn as_slice_mut<T: Element>(&mut self) -> Result<&mut [T]> {
        cast_slice_mut(self.as_bytes_mut())
    }

    /// Convert into a shareable read-only buffer.
    pub fn into_shared(self) -> SharedBuffer {
        Arc::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_elements() {
        let b = AlignedBuf::from_elements(&[1.0f32, 2.0, 3.0]).unwrap();
        assert_eq!(b.len(), 12);
        assert!(!b.is_empty());
        assert_eq!(b.as_slice::<f32>().unwrap(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_zeroed() {
        let b = AlignedBuf::zeroed(5).unwrap();
        assert_eq!(b.len(), 5);
        assert_eq!(b.as_bytes(), &[0u8; 5]);
    }

    #[test]
    fn test_alignment_holds_for_i64() {
        let b = AlignedBuf::from_elements(&[7i64, -9]).unwrap();
        assert_eq!(b.as_bytes().as_ptr() as usize % 8, 0);
        assert_eq!(b.as_slice::<i64>().unwrap(), &[7, -9]);
    }

    #[test]
    fn test_ragged_view_fails() {
        let b = AlignedBuf::zeroed(6).unwrap();
        assert!(b.as_slice::<f32>().is_err());
        assert_eq!(b.as_slice::<i16>().unwrap().len(), 3);
    }

    #[test]
    fn test_mut_slice() {
        let mut b = AlignedBuf::from_elements(&[1i32, 2]).unwrap();
        let slice = b.as_slice_mut::<i32>().unwrap();
        slice[0] = 42;
        assert_eq!(b.as_slice::<i32>().unwrap()[0], 42);
    }
}
