/// A single affine quantization: `real = scale * (q - zero_point)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantParams {
    pub scale: f32,
    pub zero_point: i32,
}

impl QuantParams {
    pub fn new(scale: f32, zero_point: i32) -> Self {
        QuantParams { scale, zero_point }
    }
}

/// Per-channel quantization table varying along `axis`.
#[derive(Debug, Clone, PartialEq)]
pub struct PerChannelParams {
    pub scales: Vec<f32>,
    pub zero_points: Vec<i32>,
    pub axis: usize,
}

/// Quantization record attached to an integer tensor.
#[derive(Debug, Clone, PartialEq)]
pub enum Quantization {
    PerTensor(QuantParams),
    PerChannel(PerChannelParams),
}

impl Quantization {
    /// Shorthand for a per-tensor record.
    pub fn per_tensor(scale: f32, zero_point: i32) -> Self {
        Quantization::PerTensor(QuantParams::new(scale, zero_point))
    }

    /// Shorthand for a per-channel record.
    pub fn per_channel(scales: Vec<f32>, zero_points: Vec<i32>, axis: usize) -> Self {
        Quantization::PerChannel(PerChannelParams {
            scales,
            zero_points,
            axis,
        })
    }

    /// Returns the single (scale, zero-point) pair of a per-tensor record.
    ///
    /// A per-channel record with exactly one channel also qualifies.
    pub fn as_per_tensor(&self) -> Option<QuantParams> {
        match self {
            Quantization::PerTensor(p) => Some(*p),
            Quantization::PerChannel(p) if p.scales.len() == 1 => {
                Some(QuantParams::new(p.scales[0], p.zero_points[0]))
            }
            Quantization::PerChannel(_) => None,
        }
    }

    /// All scales, one per channel (a single entry for per-tensor records).
    pub fn scales(&self) -> &[f32] {
        match self {
            Quantization::PerTensor(p) => std::slice::from_ref(&p.scale),
            Quantization::PerChannel(p) => &p.scales,
        }
    }

    /// All zero points, one per channel (a single entry for per-tensor records).
    pub fn zero_points(&self) -> &[i32] {
        match self {
            Quantization::PerTensor(p) => std::slice::from_ref(&p.zero_point),
            Quantization::PerChannel(p) => &p.zero_points,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_tensor_accessors() {
        let q = Quantization::per_tensor(0.5, -3);
        assert_eq!(q.scales(), &[0.5]);
        assert_eq!(q.zero_points(), &[-3]);
        assert_eq!(q.as_per_tensor(), Some(QuantParams::new(0.5, -3)));
    }

    #[test]
    fn test_per_channel_is_not_per_tensor() {
        let q = Quantization::per_channel(vec![0.1, 0.2], vec![0, 0], 0);
        assert!(q.as_per_tensor().is_none());
        let single = Quantization::per_channel(vec![0.1], vec![4], 0);
        assert_eq!(single.as_per_tensor(), Some(QuantParams::new(0.1, 4)));
    }
}
