//! Elementwise single-input kernels: ABS, NEG, SQUARE, RELU and RELU6.

use mi_quant::{
    multiply_by_quantized_multiplier, quantize_multiplier, ActivationRange, FusedActivation,
    InputOffset, OutputOffset, QuantizedMultiplier,
};
use mi_tensor::{DType, Element};

use crate::access::{prepare_output, Operand, SisoData, SisoKernel};
use crate::buffers::InPlaceSupport;
use crate::error::{Result, RuntimeError};
use crate::executor::{ConfigureContext, ExecutionContext};
use crate::graph::{OpCode, Operator};
use crate::kernels::{per_tensor_params, quantized_range, OpData};
use crate::registry::KernelRegistration;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct UnaryData {
    pub quantized: Option<QuantizedUnary>,
}

/// Requantization of RELU/RELU6 between the input and output scales.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedUnary {
    pub input_offset: InputOffset,
    pub output_offset: OutputOffset,
    pub multiplier: QuantizedMultiplier,
    pub range: ActivationRange<i32>,
}

impl QuantizedUnary {
    #[inline]
    fn apply(&self, x: i32) -> i32 {
        let scaled = multiply_by_quantized_multiplier(x + self.input_offset.value(), self.multiplier);
        self.range.clamp(scaled + self.output_offset.value())
    }
}

fn registration(op: OpCode) -> KernelRegistration {
    KernelRegistration {
        name: op.name(),
        configure,
        execute,
        in_place: InPlaceSupport::FirstInput,
    }
}

pub fn register_abs() -> KernelRegistration {
    registration(OpCode::Abs)
}

pub fn register_neg() -> KernelRegistration {
    registration(OpCode::Neg)
}

pub fn register_square() -> KernelRegistration {
    registration(OpCode::Square)
}

pub fn register_relu() -> KernelRegistration {
    registration(OpCode::Relu)
}

pub fn register_relu6() -> KernelRegistration {
    registration(OpCode::Relu6)
}

fn supports(op: OpCode, dtype: DType) -> bool {
    match op {
        OpCode::Relu | OpCode::Relu6 => matches!(dtype, DType::F32 | DType::I8),
        _ => matches!(dtype, DType::F32 | DType::I32 | DType::I64),
    }
}

fn configure(ctx: &mut ConfigureContext<'_>, op: &Operator) -> Result<OpData> {
    let k = SisoKernel::new(op)?;
    let dtype = ctx.dtype(k.input)?;
    ctx.expect_dtype(k.output, dtype)?;
    if !supports(op.opcode, dtype) {
        return Err(RuntimeError::UnsupportedType {
            op: op.opcode,
            dtype,
        });
    }
    if ctx.is_dynamic(k.input) {
        ctx.mark_dynamic(k.output)?;
    } else if !ctx.is_dynamic(k.output) {
        let shape = ctx.shape(k.input)?.clone();
        ctx.expect_shape(k.output, &shape)?;
    }

    let quantized = if dtype == DType::I8 {
        let input = per_tensor_params(ctx, k.input)?;
        let output = per_tensor_params(ctx, k.output)?;
        let activation = match op.opcode {
            OpCode::Relu6 => FusedActivation::Relu6,
            _ => FusedActivation::Relu,
        };
        Some(QuantizedUnary {
            input_offset: InputOffset::new(input),
            output_offset: OutputOffset::new(output),
            multiplier: quantize_multiplier(input.scale as f64 / output.scale as f64),
            range: quantized_range(op.opcode, activation, dtype, output)?,
        })
    } else {
        None
    };
    Ok(OpData::Unary(UnaryData { quantized }))
}

fn execute(ctx: &mut ExecutionContext<'_>, op: &Operator, data: &OpData) -> Result<()> {
    let OpData::Unary(params) = data else {
        return Err(RuntimeError::invariant("unary kernel without unary data"));
    };
    let k = SisoKernel::new(op)?;
    if ctx.is_dynamic(k.output) {
        let shape = ctx.shape(k.input)?.clone();
        prepare_output(ctx, k.output, shape)?;
    }
    let d = k.read_data(ctx)?;
    match (op.opcode, d.input.dtype) {
        (OpCode::Abs, DType::F32) => map::<f32>(d, f32::abs),
        (OpCode::Abs, DType::I32) => map::<i32>(d, i32::wrapping_abs),
        (OpCode::Abs, DType::I64) => map::<i64>(d, i64::wrapping_abs),
        (OpCode::Neg, DType::F32) => map::<f32>(d, |x| -x),
        (OpCode::Neg, DType::I32) => map::<i32>(d, i32::wrapping_neg),
        (OpCode::Neg, DType::I64) => map::<i64>(d, i64::wrapping_neg),
        (OpCode::Square, DType::F32) => map::<f32>(d, |x| x * x),
        (OpCode::Square, DType::I32) => map::<i32>(d, |x| x.wrapping_mul(x)),
        (OpCode::Square, DType::I64) => map::<i64>(d, |x| x.wrapping_mul(x)),
        (OpCode::Relu, DType::F32) => map::<f32>(d, |x| x.max(0.0)),
        (OpCode::Relu6, DType::F32) => map::<f32>(d, |x| x.clamp(0.0, 6.0)),
        (OpCode::Relu | OpCode::Relu6, DType::I8) => {
            let q = params
                .quantized
                .as_ref()
                .ok_or_else(|| RuntimeError::invariant("quantized relu without parameters"))?;
            map::<i8>(d, |x| q.apply(x as i32) as i8)
        }
        (opcode, dtype) => Err(RuntimeError::UnsupportedType { op: opcode, dtype }),
    }
}

fn map<T: Element>(d: SisoData<'_>, f: impl Fn(T) -> T) -> Result<()> {
    let input: Operand<'_, T> = d.input.typed()?;
    let out = d.output.into_typed::<T>()?;
    match input {
        Operand::Output => out.iter_mut().for_each(|x| *x = f(*x)),
        Operand::Slice(src) => {
            if src.len() != out.len() {
                return Err(RuntimeError::invariant(format!(
                    "input holds {} elements, output {}",
                    src.len(),
                    out.len()
                )));
            }
            for (o, &x) in out.iter_mut().zip(src) {
                *o = f(x);
            }
        }
    }
    Ok(())
}
