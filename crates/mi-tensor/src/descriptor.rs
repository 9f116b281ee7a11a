use crate::dtype::DType;
use crate::error::{Result, TensorError};
use crate::quant::{QuantParams, Quantization};
use crate::shape::Shape;

/// Immutable per-graph metadata describing one tensor.
///
/// The data buffer is tracked separately; a descriptor never owns bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorDescriptor {
    pub dtype: DType,
    pub shape: Shape,
    pub quantization: Option<Quantization>,
    pub name: Option<String>,
}

impl TensorDescriptor {
    pub fn new(dtype: DType, shape: impl Into<Shape>) -> Self {
        TensorDescriptor {
            dtype,
            shape: shape.into(),
            quantization: None,
            name: None,
        }
    }

    /// Attach a quantization record.
    pub fn with_quantization(mut self, quantization: Quantization) -> Self {
        self.quantization = Some(quantization);
        self
    }

    /// Attach a debug name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn num_elements(&self) -> usize {
        self.shape.numel()
    }

    /// `num_elements × size_of(dtype)`.
    pub fn byte_size(&self) -> usize {
        self.num_elements() * self.dtype.size_in_bytes()
    }

    /// The per-tensor quantization pair, if any.
    pub fn quant_params(&self) -> Option<QuantParams> {
        self.quantization.as_ref().and_then(Quantization::as_per_tensor)
    }

    /// Checks rank and dtype/quantization consistency.
    ///
    /// - rank is at most `MAX_RANK`
    /// - a quantization record implies an integer dtype
    /// - scales are finite and positive
    /// - per-channel tables match the size of their axis
    pub fn validate(&self) -> Result<()> {
        self.shape.check_rank()?;
        let Some(quantization) = &self.quantization else {
            return Ok(());
        };
        if !self.dtype.is_integer() {
            return Err(TensorError::InvalidQuantization(format!(
                "quantization record on non-integer dtype {}",
                self.dtype
            )));
        }
        if let Some(bad) = quantization
            .scales()
            .iter()
            .find(|s| !s.is_finite() || **s <= 0.0)
        {
            return Err(TensorError::InvalidQuantization(format!(
                "scale {} is not a positive finite number",
                bad
            )));
        }
        if let Quantization::PerChannel(p) = quantization {
            if p.axis >= self.shape.ndim() {
                return Err(TensorError::InvalidAxis {
                    axis: p.axis,
                    ndim: self.shape.ndim(),
                });
            }
            let channels = self.shape.dim(p.axis);
            if p.scales.len() != channels || p.zero_points.len() != channels {
                return Err(TensorError::InvalidQuantization(format!(
                    "per-channel table has {} scales and {} zero points for axis {} of size {}",
                    p.scales.len(),
                    p.zero_points.len(),
                    p.axis,
                    channels
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_size() {
        let d = TensorDescriptor::new(DType::F32, [2, 3]);
        assert_eq!(d.num_elements(), 6);
        assert_eq!(d.byte_size(), 24);
        let i = TensorDescriptor::new(DType::I64, [5]);
        assert_eq!(i.byte_size(), 40);
    }

    #[test]
    fn test_quantized_float_rejected() {
        let d = TensorDescriptor::new(DType::F32, [4])
            .with_quantization(Quantization::per_tensor(0.1, 0));
        assert!(matches!(
            d.validate(),
            Err(TensorError::InvalidQuantization(_))
        ));
    }

    #[test]
    fn test_per_channel_length_checked() {
        let ok = TensorDescriptor::new(DType::I8, [3, 2])
            .with_quantization(Quantization::per_channel(vec![0.1; 3], vec![0; 3], 0));
        assert!(ok.validate().is_ok());

        let bad = TensorDescriptor::new(DType::I8, [3, 2])
            .with_quantization(Quantization::per_channel(vec![0.1; 2], vec![0; 2], 0));
        assert!(bad.validate().is_err());

        let bad_axis = TensorDescriptor::new(DType::I8, [3, 2])
            .with_quantization(Quantization::per_channel(vec![0.1; 3], vec![0; 3], 2));
        assert!(matches!(
            bad_axis.validate(),
            Err(TensorError::InvalidAxis { axis: 2, ndim: 2 })
        ));
    }

    #[test]
    fn test_non_positive_scale_rejected() {
        let d = TensorDescriptor::new(DType::I8, [1])
            .with_quantization(Quantization::per_tensor(0.0, 0));
        assert!(d.validate().is_err());
    }
}
