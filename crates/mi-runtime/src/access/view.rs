use mi_tensor::{cast_slice, cast_slice_mut, DType, Element, Shape};

use crate::error::{Result, RuntimeError};

/// Where an input's elements live during one execute call.
#[derive(Debug)]
pub enum Operand<'a, T> {
    Slice(&'a [T]),
    /// The input was handed to the output buffer; read it from there.
    Output,
}

impl<T> Clone for Operand<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Operand<'_, T> {}

impl<'a, T: Copy> Operand<'a, T> {
    /// Element `input_index` of this operand, reading the output slot
    /// `output_index` when the operand aliases the output.
    #[inline]
    pub fn at(&self, out: &[T], input_index: usize, output_index: usize) -> T {
        match self {
            Operand::Slice(s) => s[input_index],
            Operand::Output => out[output_index],
        }
    }

    pub fn is_output(&self) -> bool {
        matches!(self, Operand::Output)
    }
}

/// A resolved kernel input.
#[derive(Debug, Clone, Copy)]
pub struct InputView<'a> {
    pub index: usize,
    pub bytes: Operand<'a, u8>,
    pub shape: &'a Shape,
    pub dtype: DType,
}

impl<'a> InputView<'a> {
    pub fn typed<T: Element>(&self) -> Result<Operand<'a, T>> {
        self.check::<T>()?;
        Ok(match self.bytes {
            Operand::Slice(b) => Operand::Slice(cast_slice(b)?),
            Operand::Output => Operand::Output,
        })
    }

    /// The input as a plain slice. Fails for an input aliased to the output.
    pub fn slice<T: Element>(&self) -> Result<&'a [T]> {
        self.check::<T>()?;
        Ok(cast_slice(self.raw()?)?)
    }

    pub fn raw(&self) -> Result<&'a [u8]> {
        match self.bytes {
            Operand::Slice(b) => Ok(b),
            Operand::Output => Err(RuntimeError::invariant(format!(
                "tensor {} is aliased to the output and has no separate buffer",
                self.index
            ))),
        }
    }

    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    fn check<T: Element>(&self) -> Result<()> {
        if T::accepts(self.dtype) {
            Ok(())
        } else {
            Err(RuntimeError::TypeMismatch {
                tensor: self.index,
                expected: T::DTYPE,
                got: self.dtype,
            })
        }
    }
}

/// The writable output of a kernel.
#[derive(Debug)]
pub struct OutputView<'a> {
    pub index: usize,
    pub bytes: &'a mut [u8],
    pub shape: &'a Shape,
    pub dtype: DType,
}

impl<'a> OutputView<'a> {
    pub fn into_typed<T: Element>(self) -> Result<&'a mut [T]> {
        if !T::accepts(self.dtype) {
            return Err(RuntimeError::TypeMismatch {
                tensor: self.index,
                expected: T::DTYPE,
                got: self.dtype,
            });
        }
        Ok(cast_slice_mut(self.bytes)?)
    }
}
