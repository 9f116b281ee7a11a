use crate::descriptor::TensorDescriptor;
use crate::dtype::DType;
use crate::element::Element;
use crate::error::{Result, TensorError};
use crate::quant::Quantization;
use crate::shape::Shape;
use crate::storage::AlignedBuf;

/// An owned tensor: descriptor plus the bytes it describes.
///
/// Used to hand constant data to a graph and to read results back in typed
/// form. The interpreter itself tracks buffers per tensor slot instead.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    descriptor: TensorDescriptor,
    data: AlignedBuf,
}

impl Tensor {
    /// Create a tensor from typed data and a shape.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if `data.len() != shape.numel()`.
    pub fn from_slice<T: Element>(data: &[T], shape: impl Into<Shape>) -> Result<Self> {
        let shape = shape.into();
        if data.len() != shape.numel() {
            return Err(TensorError::ShapeMismatch {
                expected: shape.dims().to_vec(),
                got: vec![data.len()],
            });
        }
        Ok(Tensor {
            descriptor: TensorDescriptor::new(T::DTYPE, shape),
            data: AlignedBuf::from_elements(data)?,
        })
    }

    /// Create a boolean tensor.
    pub fn from_bools(data: &[bool], shape: impl Into<Shape>) -> Result<Self> {
        let bytes: Vec<u8> = data.iter().map(|&b| b as u8).collect();
        let mut t = Tensor::from_slice(&bytes, shape)?;
        t.descriptor.dtype = DType::Bool;
        Ok(t)
    }

    /// Create a zero-filled tensor.
    pub fn zeros(dtype: DType, shape: impl Into<Shape>) -> Result<Self> {
        let descriptor = TensorDescriptor::new(dtype, shape);
        let data = AlignedBuf::zeroed(descriptor.byte_size())?;
        Ok(Tensor { descriptor, data })
    }

    /// Wrap raw bytes described by `descriptor`.
    ///
    /// # Errors
    /// Returns `BufferLength` if the byte count disagrees with the descriptor.
    pub fn from_parts(descriptor: TensorDescriptor, data: AlignedBuf) -> Result<Self> {
        if data.len() != descriptor.byte_size() {
            return Err(TensorError::BufferLength {
                expected: descriptor.byte_size(),
                got: data.len(),
            });
        }
        Ok(Tensor { descriptor, data })
    }

    /// Attach a quantization record, validating it against the shape and dtype.
    pub fn with_quantization(mut self, quantization: Quantization) -> Result<Self> {
        self.descriptor.quantization = Some(quantization);
        self.descriptor.validate()?;
        Ok(self)
    }

    pub fn descriptor(&self) -> &TensorDescriptor {
        &self.descriptor
    }

    pub fn shape(&self) -> &Shape {
        &self.descriptor.shape
    }

    pub fn dtype(&self) -> DType {
        self.descriptor.dtype
    }

    pub fn data(&self) -> &AlignedBuf {
        &self.data
    }

    /// Returns the elements as a typed slice.
    ///
    /// # Errors
    /// Returns `DTypeMismatch` if `T` does not match the tensor's dtype.
    pub fn as_slice<T: Element>(&self) -> Result<&[T]> {
        if !T::accepts(self.dtype()) {
            return Err(TensorError::DTypeMismatch {
                expected: self.dtype(),
                got: T::DTYPE,
            });
        }
        self.data.as_slice()
    }

    /// Reshape the tensor, keeping its data.
    ///
    /// The total number of elements must remain the same.
    pub fn reshape(&self, new_shape: impl Into<Shape>) -> Result<Tensor> {
        let new_shape = new_shape.into();
        if self.shape().numel() != new_shape.numel() {
            return Err(TensorError::ShapeMismatch {
                expected: self.shape().dims().to_vec(),
                got: new_shape.dims().to_vec(),
            });
        }
        let mut descriptor = self.descriptor.clone();
        descriptor.shape = new_shape;
        Ok(Tensor {
            descriptor,
            data: self.data.clone(),
        })
    }

    pub fn into_parts(self) -> (TensorDescriptor, AlignedBuf) {
        (self.descriptor, self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_tensor() {
        let t = Tensor::from_slice(&[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], [2, 3]).unwrap();
        assert_eq!(t.shape().ndim(), 2);
        assert_eq!(t.shape().dim(0), 2);
        assert_eq!(t.shape().dim(1), 3);
        assert_eq!(t.dtype(), DType::F32);
        assert_eq!(t.as_slice::<f32>().unwrap(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_length_mismatch() {
        assert!(Tensor::from_slice(&[1.0f32, 2.0], [3]).is_err());
    }

    #[test]
    fn test_wrong_element_type() {
        let t = Tensor::from_slice(&[1i32, 2], [2]).unwrap();
        assert!(matches!(
            t.as_slice::<f32>(),
            Err(TensorError::DTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_bools() {
        let t = Tensor::from_bools(&[true, false], [2]).unwrap();
        assert_eq!(t.dtype(), DType::Bool);
        assert_eq!(t.as_slice::<u8>().unwrap(), &[1, 0]);
    }

    #[test]
    fn test_reshape() {
        let t = Tensor::from_slice(&[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], [2, 3]).unwrap();
        let r = t.reshape([3, 2]).unwrap();
        assert_eq!(r.shape().dims(), &[3, 2]);
        assert_eq!(r.as_slice::<f32>().unwrap(), t.as_slice::<f32>().unwrap());
        assert!(t.reshape([4]).is_err());
    }

    #[test]
    fn test_quantized_tensor() {
        let t = Tensor::from_slice(&[1i8, -2], [2])
            .unwrap()
            .with_quantization(Quantization::per_tensor(0.5, 0))
            .unwrap();
        assert_eq!(t.descriptor().quant_params().unwrap().scale, 0.5);
        assert!(Tensor::from_slice(&[1.0f32], [1])
            .unwrap()
            .with_quantization(Quantization::per_tensor(0.5, 0))
            .is_err());
    }
}
