use crate::error::{QuantError, Result};
use crate::multiplier::{quantize_multiplier, QuantizedMultiplier};

/// One output multiplier per output channel, used by per-channel
/// convolution and fully-connected kernels.
///
/// Channel `c` encodes `input_scale × filter_scales[c] / output_scale`.
#[derive(Debug, Clone, PartialEq)]
pub struct PerChannelMultipliers {
    multipliers: Vec<QuantizedMultiplier>,
}

impl PerChannelMultipliers {
    /// Builds the table for `channels` output channels.
    ///
    /// A single filter scale is broadcast to every channel.
    ///
    /// # Errors
    ///
    /// Returns `ChannelCount` when `filter_scales` has neither one entry nor
    /// `channels` entries, and `MultiplierOutOfRange` for a non-finite or
    /// negative effective scale.
    pub fn new(
        input_scale: f32,
        filter_scales: &[f32],
        output_scale: f32,
        channels: usize,
    ) -> Result<Self> {
        if filter_scales.len() != 1 && filter_scales.len() != channels {
            return Err(QuantError::ChannelCount {
                expected: channels,
                got: filter_scales.len(),
            });
        }
        let multipliers = (0..channels)
            .map(|c| {
                let filter_scale = if filter_scales.len() == 1 {
                    filter_scales[0]
                } else {
                    filter_scales[c]
                };
                let real = input_scale as f64 * filter_scale as f64 / output_scale as f64;
                if !real.is_finite() || real < 0.0 {
                    return Err(QuantError::MultiplierOutOfRange {
                        value: real,
                        range: "[0, inf)",
                    });
                }
                Ok(quantize_multiplier(real))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { multipliers })
    }

    pub fn len(&self) -> usize {
        self.multipliers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.multipliers.is_empty()
    }

    /// # Panics
    ///
    /// Panics if `channel >= self.len()`.
    pub fn get(&self, channel: usize) -> QuantizedMultiplier {
        self.multipliers[channel]
    }

    pub fn as_slice(&self) -> &[QuantizedMultiplier] {
        &self.multipliers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_per_channel_scales() {
        let table = PerChannelMultipliers::new(0.5, &[0.1, 0.2], 0.25, 2).unwrap();
        assert_eq!(table.len(), 2);
        assert_relative_eq!(table.get(0).to_real(), 0.2, max_relative = 1e-6);
        assert_relative_eq!(table.get(1).to_real(), 0.4, max_relative = 1e-6);
    }

    #[test]
    fn test_single_scale_broadcasts() {
        let table = PerChannelMultipliers::new(1.0, &[0.5], 1.0, 3).unwrap();
        assert_eq!(table.len(), 3);
        assert!(table.as_slice().iter().all(|m| *m == table.get(0)));
    }

    #[test]
    fn test_channel_count_mismatch() {
        let err = PerChannelMultipliers::new(1.0, &[0.5, 0.5], 1.0, 3).unwrap_err();
        assert_eq!(err, QuantError::ChannelCount { expected: 3, got: 2 });
    }

    #[test]
    fn test_zero_output_scale_rejected() {
        assert!(PerChannelMultipliers::new(1.0, &[0.5], 0.0, 1).is_err());
    }
}
