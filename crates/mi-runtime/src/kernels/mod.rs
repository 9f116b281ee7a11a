//! Built-in kernels.
//!
//! Every kernel is a configure/execute pair over the access helpers. Configure
//! validates and returns an [`OpData`]; execute consumes it.

pub mod arithmetic;
pub mod comparison;
pub mod control_flow;
pub mod conv;
pub mod fully_connected;
pub mod quantize;
pub mod reshape;
pub mod select;
pub mod slice;
pub mod unary;

use mi_quant::{
    multiply_by_quantized_multiplier, ActivationRange, FilterOffset, FusedActivation, InputOffset,
    OutputOffset, PerChannelMultipliers, QuantError,
};
use mi_tensor::{cast_slice, DType, QuantParams, Quantization};

use crate::error::{Result, RuntimeError};
use crate::executor::ConfigureContext;
use crate::graph::{OpCode, Operator};
use crate::registry::KernelRegistry;

/// Per-operator parameters derived at configure.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum OpData {
    #[default]
    None,
    Arithmetic(arithmetic::ArithmeticData),
    Unary(unary::UnaryData),
    Reshape(reshape::ReshapeData),
    Slice(slice::SliceData),
    FullyConnected(fully_connected::FullyConnectedData),
    Conv2D(conv::Conv2DData),
    Quantize(quantize::QuantizeData),
    If(control_flow::IfData),
    While(control_flow::WhileData),
}

pub fn register_builtins(registry: &mut KernelRegistry) {
    let builtins = [
        (OpCode::Add, arithmetic::register_add()),
        (OpCode::Sub, arithmetic::register_sub()),
        (OpCode::Mul, arithmetic::register_mul()),
        (OpCode::Abs, unary::register_abs()),
        (OpCode::Neg, unary::register_neg()),
        (OpCode::Square, unary::register_square()),
        (OpCode::Relu, unary::register_relu()),
        (OpCode::Relu6, unary::register_relu6()),
        (OpCode::Less, comparison::register_less()),
        (OpCode::Greater, comparison::register_greater()),
        (OpCode::Equal, comparison::register_equal()),
        (OpCode::NotEqual, comparison::register_not_equal()),
        (OpCode::Select, select::register_select()),
        (OpCode::Reshape, reshape::register_reshape()),
        (OpCode::Slice, slice::register_slice()),
        (OpCode::FullyConnected, fully_connected::register_fully_connected()),
        (OpCode::Conv2D, conv::register_conv2d()),
        (OpCode::Quantize, quantize::register_quantize()),
        (OpCode::Dequantize, quantize::register_dequantize()),
        (OpCode::If, control_flow::register_if()),
        (OpCode::While, control_flow::register_while()),
    ];
    for (op, registration) in builtins {
        registry.register(op, registration);
    }
}

/// Integer parameters shared by the filter-based kernels: accumulate
/// `(x + input_offset) * (w + filter_offset)` into `i32`, then requantize
/// per output channel.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedAccumulation {
    pub input_offset: InputOffset,
    pub filter_offset: FilterOffset,
    pub output_offset: OutputOffset,
    pub multipliers: PerChannelMultipliers,
    pub range: ActivationRange<i32>,
}

impl QuantizedAccumulation {
    /// Derives the parameters for `channels` output channels. Per-channel
    /// filter quantization must run along axis 0 with zero points of 0.
    pub(crate) fn configure(
        ctx: &ConfigureContext<'_>,
        op: &Operator,
        tensors: (usize, usize, usize),
        channels: usize,
        activation: FusedActivation,
    ) -> Result<Self> {
        let (input, filter, output) = tensors;
        let input_params = per_tensor_params(ctx, input)?;
        let output_params = per_tensor_params(ctx, output)?;
        let quantization = ctx
            .descriptor(filter)?
            .quantization
            .as_ref()
            .ok_or(RuntimeError::Quant(QuantError::MissingQuantization))?;
        let (scales, zero_points) = (quantization.scales(), quantization.zero_points());
        if let Quantization::PerChannel(p) = quantization {
            if p.scales.len() > 1 && (p.axis != 0 || p.zero_points.iter().any(|&z| z != 0)) {
                return Err(RuntimeError::QuantizationMismatch(format!(
                    "{} needs per-channel filter quantization on axis 0 with zero points of 0",
                    op.opcode
                )));
            }
        }
        let filter_scale = scales
            .first()
            .copied()
            .ok_or(RuntimeError::Quant(QuantError::MissingQuantization))?;
        let filter_params = QuantParams::new(filter_scale, zero_points.first().copied().unwrap_or(0));
        Ok(QuantizedAccumulation {
            input_offset: InputOffset::new(input_params),
            filter_offset: FilterOffset::new(filter_params),
            output_offset: OutputOffset::new(output_params),
            multipliers: PerChannelMultipliers::new(
                input_params.scale,
                scales,
                output_params.scale,
                channels,
            )?,
            range: quantized_range(op.opcode, activation, ctx.dtype(output)?, output_params)?,
        })
    }

    #[inline]
    pub fn requantize(&self, acc: i32, channel: usize) -> i32 {
        let scaled = multiply_by_quantized_multiplier(acc, self.multipliers.get(channel));
        self.range.clamp(scaled + self.output_offset.value())
    }
}

/// The per-tensor quantization of `t`.
pub(crate) fn per_tensor_params(ctx: &ConfigureContext<'_>, t: usize) -> Result<QuantParams> {
    ctx.descriptor(t)?
        .quant_params()
        .ok_or(RuntimeError::Quant(QuantError::MissingQuantization))
}

/// Quantized clamp window for a fused activation, rejecting `Tanh`.
pub(crate) fn quantized_range(
    op: OpCode,
    activation: FusedActivation,
    dtype: DType,
    params: QuantParams,
) -> Result<ActivationRange<i32>> {
    activation
        .range_quantized(dtype, params)
        .map_err(|e| match e {
            QuantError::UnsupportedActivation(activation) => {
                RuntimeError::UnsupportedActivation { op, activation }
            }
            other => other.into(),
        })
}

/// Clamp window for plain (non-quantized) integer arithmetic.
pub(crate) fn integer_range(op: OpCode, activation: FusedActivation) -> Result<(i64, i64)> {
    match activation {
        FusedActivation::None => Ok((i64::MIN, i64::MAX)),
        FusedActivation::Relu => Ok((0, i64::MAX)),
        FusedActivation::Relu6 => Ok((0, 6)),
        FusedActivation::ReluN1To1 => Ok((-1, 1)),
        FusedActivation::Tanh => Err(RuntimeError::UnsupportedActivation { op, activation }),
    }
}

/// Reads an `I32` or `I64` index tensor.
pub(crate) fn index_values(bytes: &[u8], dtype: DType, tensor: usize) -> Result<Vec<i64>> {
    match dtype {
        DType::I32 => Ok(cast_slice::<i32>(bytes)?.iter().map(|&v| v as i64).collect()),
        DType::I64 => Ok(cast_slice::<i64>(bytes)?.to_vec()),
        got => Err(RuntimeError::TypeMismatch {
            tensor,
            expected: DType::I32,
            got,
        }),
    }
}

/// Rejects anything but a 1-D index tensor.
pub(crate) fn expect_vector(ctx: &ConfigureContext<'_>, t: usize) -> Result<()> {
    let shape = ctx.shape(t)?;
    if shape.ndim() != 1 {
        return Err(RuntimeError::InvalidShape(format!(
            "tensor {t} must be a vector, got {shape}"
        )));
    }
    Ok(())
}
