//! ADD, SUB and MUL with broadcasting and fused activations.
//!
//! Integer kernels follow the usual reference scheme: add and subtract
//! rescale both operands to a shared scale with `LEFT_SHIFT` bits of
//! headroom, multiply requantizes the raw product.

use log::debug;
use mi_quant::{
    multiply_by_quantized_multiplier, quantize_multiplier, quantize_multiplier_smaller_than_one,
    ActivationRange, FusedActivation, InputOffset, OutputOffset, QuantizedMultiplier,
};
use mi_tensor::{DType, Element, QuantParams, Shape};

use crate::access::{binary_same, prepare_output, TisoData, TisoKernel};
use crate::buffers::InPlaceSupport;
use crate::error::{Result, RuntimeError};
use crate::executor::{ConfigureContext, ExecutionContext};
use crate::graph::{OpCode, Operator};
use crate::kernels::{integer_range, per_tensor_params, quantized_range, OpData};
use crate::registry::KernelRegistration;

const LEFT_SHIFT_I8: i32 = 20;
const LEFT_SHIFT_I16: i32 = 15;

#[derive(Debug, Clone, PartialEq)]
pub struct ArithmeticData {
    pub activation: FusedActivation,
    /// Clamp for plain `I32`/`I64` arithmetic.
    pub int_range: (i64, i64),
    pub quantized: Option<QuantizedArithmetic>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QuantizedArithmetic {
    AddSub(AddSubParams),
    Mul(MulParams),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddSubParams {
    pub left_shift: i32,
    pub input1_offset: InputOffset,
    pub input2_offset: InputOffset,
    pub output_offset: OutputOffset,
    pub input1_multiplier: QuantizedMultiplier,
    pub input2_multiplier: QuantizedMultiplier,
    pub output_multiplier: QuantizedMultiplier,
    pub range: ActivationRange<i32>,
}

impl AddSubParams {
    fn new(
        dtype: DType,
        in1: QuantParams,
        in2: QuantParams,
        out: QuantParams,
        range: ActivationRange<i32>,
    ) -> Result<Self> {
        let left_shift = match dtype {
            DType::I16 => LEFT_SHIFT_I16,
            _ => LEFT_SHIFT_I8,
        };
        let twice_max_input_scale = 2.0 * (in1.scale as f64).max(in2.scale as f64);
        let real_input1 = in1.scale as f64 / twice_max_input_scale;
        let real_input2 = in2.scale as f64 / twice_max_input_scale;
        let real_output = twice_max_input_scale / ((1i64 << left_shift) as f64 * out.scale as f64);
        Ok(AddSubParams {
            left_shift,
            input1_offset: InputOffset::new(in1),
            input2_offset: InputOffset::new(in2),
            output_offset: OutputOffset::new(out),
            input1_multiplier: quantize_multiplier_smaller_than_one(real_input1)?,
            input2_multiplier: quantize_multiplier_smaller_than_one(real_input2)?,
            output_multiplier: quantize_multiplier(real_output),
            range,
        })
    }

    #[inline]
    fn apply(&self, x1: i32, x2: i32, subtract: bool) -> i32 {
        let shifted1 = (x1 + self.input1_offset.value()) << self.left_shift;
        let shifted2 = (x2 + self.input2_offset.value()) << self.left_shift;
        let scaled1 = multiply_by_quantized_multiplier(shifted1, self.input1_multiplier);
        let scaled2 = multiply_by_quantized_multiplier(shifted2, self.input2_multiplier);
        let raw = if subtract {
            scaled1 - scaled2
        } else {
            scaled1 + scaled2
        };
        let out = multiply_by_quantized_multiplier(raw, self.output_multiplier)
            + self.output_offset.value();
        self.range.clamp(out)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MulParams {
    pub input1_offset: InputOffset,
    pub input2_offset: InputOffset,
    pub output_offset: OutputOffset,
    pub output_multiplier: QuantizedMultiplier,
    pub range: ActivationRange<i32>,
}

impl MulParams {
    #[inline]
    fn apply(&self, x1: i32, x2: i32) -> i32 {
        let raw = (x1 + self.input1_offset.value()).wrapping_mul(x2 + self.input2_offset.value());
        let out = multiply_by_quantized_multiplier(raw, self.output_multiplier)
            + self.output_offset.value();
        self.range.clamp(out)
    }
}

pub fn register_add() -> KernelRegistration {
    KernelRegistration {
        name: OpCode::Add.name(),
        configure,
        execute,
        in_place: InPlaceSupport::AnyInput,
    }
}

pub fn register_sub() -> KernelRegistration {
    KernelRegistration {
        name: OpCode::Sub.name(),
        configure,
        execute,
        in_place: InPlaceSupport::AnyInput,
    }
}

pub fn register_mul() -> KernelRegistration {
    KernelRegistration {
        name: OpCode::Mul.name(),
        configure,
        execute,
        in_place: InPlaceSupport::AnyInput,
    }
}

fn configure(ctx: &mut ConfigureContext<'_>, op: &Operator) -> Result<OpData> {
    let k = TisoKernel::new(op)?;
    let dtype = ctx.dtype(k.input1)?;
    ctx.expect_dtype(k.input2, dtype)?;
    ctx.expect_dtype(k.output, dtype)?;
    if !matches!(
        dtype,
        DType::F32 | DType::I32 | DType::I64 | DType::I8 | DType::I16
    ) {
        return Err(RuntimeError::UnsupportedType {
            op: op.opcode,
            dtype,
        });
    }

    if ctx.is_dynamic(k.input1) || ctx.is_dynamic(k.input2) {
        ctx.mark_dynamic(k.output)?;
    } else if !ctx.is_dynamic(k.output) {
        let shape = Shape::broadcast_shape(ctx.shape(k.input1)?, ctx.shape(k.input2)?)?;
        ctx.expect_shape(k.output, &shape)?;
    }

    let activation = op.options.activation();
    let quantized = match dtype {
        DType::I8 | DType::I16 => Some(configure_quantized(ctx, op, &k, dtype, activation)?),
        _ => None,
    };
    let int_range = match dtype {
        DType::I32 | DType::I64 => integer_range(op.opcode, activation)?,
        _ => (i64::MIN, i64::MAX),
    };
    Ok(OpData::Arithmetic(ArithmeticData {
        activation,
        int_range,
        quantized,
    }))
}

fn configure_quantized(
    ctx: &ConfigureContext<'_>,
    op: &Operator,
    k: &TisoKernel,
    dtype: DType,
    activation: FusedActivation,
) -> Result<QuantizedArithmetic> {
    let in1 = per_tensor_params(ctx, k.input1)?;
    let in2 = per_tensor_params(ctx, k.input2)?;
    let out = per_tensor_params(ctx, k.output)?;
    if dtype == DType::I16 && (in1.zero_point != 0 || in2.zero_point != 0 || out.zero_point != 0) {
        return Err(RuntimeError::QuantizationMismatch(format!(
            "{} on int16 requires zero points of 0",
            op.opcode
        )));
    }
    let range = quantized_range(op.opcode, activation, dtype, out)?;
    let params = match op.opcode {
        OpCode::Mul => {
            let real = in1.scale as f64 * in2.scale as f64 / out.scale as f64;
            QuantizedArithmetic::Mul(MulParams {
                input1_offset: InputOffset::new(in1),
                input2_offset: InputOffset::new(in2),
                output_offset: OutputOffset::new(out),
                output_multiplier: quantize_multiplier(real),
                range,
            })
        }
        _ => QuantizedArithmetic::AddSub(AddSubParams::new(dtype, in1, in2, out, range)?),
    };
    debug!("{}: quantized {dtype} parameters {params:?}", op.opcode);
    Ok(params)
}

fn execute(ctx: &mut ExecutionContext<'_>, op: &Operator, data: &OpData) -> Result<()> {
    let OpData::Arithmetic(params) = data else {
        return Err(RuntimeError::invariant("arithmetic kernel without arithmetic data"));
    };
    let k = TisoKernel::new(op)?;
    if ctx.is_dynamic(k.output) {
        let shape = Shape::broadcast_shape(ctx.shape(k.input1)?, ctx.shape(k.input2)?)?;
        prepare_output(ctx, k.output, shape)?;
    }
    let d = k.read_data(ctx)?;
    let activation = params.activation;
    let (lo, hi) = params.int_range;
    match (op.opcode, d.output.dtype) {
        (_, DType::F32) => {
            let f: fn(f32, f32) -> f32 = match op.opcode {
                OpCode::Add => |a, b| a + b,
                OpCode::Sub => |a, b| a - b,
                _ => |a, b| a * b,
            };
            apply::<f32>(d, |a, b| activation.apply(f(a, b)))
        }
        (opcode, DType::I32) => {
            let (lo, hi) = (lo.max(i32::MIN as i64) as i32, hi.min(i32::MAX as i64) as i32);
            let f: fn(i32, i32) -> i32 = match opcode {
                OpCode::Add => i32::wrapping_add,
                OpCode::Sub => i32::wrapping_sub,
                _ => i32::wrapping_mul,
            };
            apply::<i32>(d, |a, b| f(a, b).clamp(lo, hi))
        }
        (opcode, DType::I64) => {
            let f: fn(i64, i64) -> i64 = match opcode {
                OpCode::Add => i64::wrapping_add,
                OpCode::Sub => i64::wrapping_sub,
                _ => i64::wrapping_mul,
            };
            apply::<i64>(d, |a, b| f(a, b).clamp(lo, hi))
        }
        (opcode, DType::I8) => {
            let q = quantized(params)?;
            match q {
                QuantizedArithmetic::AddSub(p) => {
                    let subtract = opcode == OpCode::Sub;
                    apply::<i8>(d, |a, b| p.apply(a as i32, b as i32, subtract) as i8)
                }
                QuantizedArithmetic::Mul(p) => apply::<i8>(d, |a, b| p.apply(a as i32, b as i32) as i8),
            }
        }
        (opcode, DType::I16) => {
            let q = quantized(params)?;
            match q {
                QuantizedArithmetic::AddSub(p) => {
                    let subtract = opcode == OpCode::Sub;
                    apply::<i16>(d, |a, b| p.apply(a as i32, b as i32, subtract) as i16)
                }
                QuantizedArithmetic::Mul(p) => {
                    apply::<i16>(d, |a, b| p.apply(a as i32, b as i32) as i16)
                }
            }
        }
        (opcode, dtype) => Err(RuntimeError::UnsupportedType { op: opcode, dtype }),
    }
}

fn quantized(params: &ArithmeticData) -> Result<&QuantizedArithmetic> {
    params
        .quantized
        .as_ref()
        .ok_or_else(|| RuntimeError::invariant("quantized arithmetic without parameters"))
}

fn apply<T: Element>(d: TisoData<'_>, f: impl Fn(T, T) -> T) -> Result<()> {
    let a = d.input1.typed::<T>()?;
    let b = d.input2.typed::<T>()?;
    let (a_shape, b_shape, out_shape) = (d.input1.shape, d.input2.shape, d.output.shape);
    let out = d.output.into_typed::<T>()?;
    binary_same(a, a_shape, b, b_shape, out, out_shape, f)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_params(scale1: f32, scale2: f32, out: f32) -> AddSubParams {
        AddSubParams::new(
            DType::I8,
            QuantParams::new(scale1, 0),
            QuantParams::new(scale2, 0),
            QuantParams::new(out, 0),
            ActivationRange::new(-128, 127),
        )
        .unwrap()
    }

    #[test]
    fn test_quantized_add_same_scales() {
        let p = add_params(0.1, 0.1, 0.1);
        assert_eq!(p.apply(10, 20, false), 30);
        assert_eq!(p.apply(10, 20, true), -10);
        assert_eq!(p.apply(100, 100, false), 127);
    }

    #[test]
    fn test_quantized_add_mixed_scales() {
        // 1.0 + 1.0 with the second input at double resolution.
        let p = add_params(0.1, 0.05, 0.1);
        assert_eq!(p.apply(10, 20, false), 20);
    }

    #[test]
    fn test_quantized_mul() {
        let in1 = QuantParams::new(0.5, 0);
        let in2 = QuantParams::new(0.5, 0);
        let out = QuantParams::new(0.25, 0);
        let p = MulParams {
            input1_offset: InputOffset::new(in1),
            input2_offset: InputOffset::new(in2),
            output_offset: OutputOffset::new(out),
            output_multiplier: quantize_multiplier(1.0),
            range: ActivationRange::new(-128, 127),
        };
        // 1.5 * 2.0 = 3.0 -> 12 at scale 0.25
        assert_eq!(p.apply(3, 4), 12);
        assert_eq!(p.apply(-3, 4), -12);
    }
}
