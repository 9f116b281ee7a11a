use std::fmt;

/// Element types a tensor can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// 32-bit floating point.
    F32,
    /// 16-bit floating point (IEEE 754 half-precision, via the `half` crate).
    F16,
    /// 8-bit signed integer, the usual quantized activation type.
    I8,
    /// 16-bit signed integer.
    I16,
    /// 32-bit signed integer (also used for quantized biases).
    I32,
    /// 64-bit signed integer.
    I64,
    /// 8-bit unsigned integer.
    U8,
    /// Boolean, stored as one byte (0 = false, anything else = true).
    Bool,
}

impl DType {
    /// Returns the size in bytes of a single element.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::I8 | DType::U8 | DType::Bool => 1,
            DType::F16 | DType::I16 => 2,
            DType::F32 | DType::I32 => 4,
            DType::I64 => 8,
        }
    }

    /// Returns true for the integer types that may carry a quantization record.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            DType::I8 | DType::I16 | DType::I32 | DType::I64 | DType::U8
        )
    }

    /// Returns true for floating point types.
    pub fn is_float(&self) -> bool {
        matches!(self, DType::F32 | DType::F16)
    }

    /// Inclusive value range of an integer type, or `None` for float and bool.
    pub fn integer_range(&self) -> Option<(i64, i64)> {
        match self {
            DType::I8 => Some((i8::MIN as i64, i8::MAX as i64)),
            DType::U8 => Some((u8::MIN as i64, u8::MAX as i64)),
            DType::I16 => Some((i16::MIN as i64, i16::MAX as i64)),
            DType::I32 => Some((i32::MIN as i64, i32::MAX as i64)),
            DType::I64 => Some((i64::MIN, i64::MAX)),
            DType::F32 | DType::F16 | DType::Bool => None,
        }
    }

    /// Converts a TFLite `TensorType` code to a `DType`.
    ///
    /// Codes: 0 => F32, 1 => F16, 2 => I32, 3 => U8, 4 => I64, 6 => Bool,
    /// 7 => I16, 9 => I8.
    pub fn from_tflite_type(id: u32) -> Option<DType> {
        match id {
            0 => Some(DType::F32),
            1 => Some(DType::F16),
            2 => Some(DType::I32),
            3 => Some(DType::U8),
            4 => Some(DType::I64),
            6 => Some(DType::Bool),
            7 => Some(DType::I16),
            9 => Some(DType::I8),
            _ => None,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F32 => write!(f, "f32"),
            DType::F16 => write!(f, "f16"),
            DType::I8 => write!(f, "i8"),
            DType::I16 => write!(f, "i16"),
            DType::I32 => write!(f, "i32"),
            DType::I64 => write!(f, "i64"),
            DType::U8 => write!(f, "u8"),
            DType::Bool => write!(f, "bool"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_in_bytes() {
        assert_eq!(DType::F32.size_in_bytes(), 4);
        assert_eq!(DType::F16.size_in_bytes(), 2);
        assert_eq!(DType::I8.size_in_bytes(), 1);
        assert_eq!(DType::I64.size_in_bytes(), 8);
        assert_eq!(DType::Bool.size_in_bytes(), 1);
    }

    #[test]
    fn test_integer_range() {
        assert_eq!(DType::I8.integer_range(), Some((-128, 127)));
        assert_eq!(DType::U8.integer_range(), Some((0, 255)));
        assert_eq!(DType::F32.integer_range(), None);
        assert!(!DType::Bool.is_integer());
    }

    #[test]
    fn test_tflite_codes() {
        assert_eq!(DType::from_tflite_type(9), Some(DType::I8));
        assert_eq!(DType::from_tflite_type(6), Some(DType::Bool));
        assert!(DType::from_tflite_type(999).is_none());
    }
}
