//! LESS, GREATER, EQUAL and NOT_EQUAL producing `Bool` tensors.
//!
//! Quantized operands are compared on their raw integers, so both inputs
//! must share scale and zero point.

use mi_tensor::{DType, Element, Shape};

use crate::access::{binary_map, prepare_output, TisoData, TisoKernel};
use crate::buffers::InPlaceSupport;
use crate::error::{Result, RuntimeError};
use crate::executor::{ConfigureContext, ExecutionContext};
use crate::graph::{OpCode, Operator};
use crate::kernels::OpData;
use crate::registry::KernelRegistration;

fn registration(op: OpCode) -> KernelRegistration {
    KernelRegistration {
        name: op.name(),
        configure,
        execute,
        in_place: InPlaceSupport::None,
    }
}

pub fn register_less() -> KernelRegistration {
    registration(OpCode::Less)
}

pub fn register_greater() -> KernelRegistration {
    registration(OpCode::Greater)
}

pub fn register_equal() -> KernelRegistration {
    registration(OpCode::Equal)
}

pub fn register_not_equal() -> KernelRegistration {
    registration(OpCode::NotEqual)
}

fn is_equality(op: OpCode) -> bool {
    matches!(op, OpCode::Equal | OpCode::NotEqual)
}

fn configure(ctx: &mut ConfigureContext<'_>, op: &Operator) -> Result<OpData> {
    let k = TisoKernel::new(op)?;
    let dtype = ctx.dtype(k.input1)?;
    ctx.expect_dtype(k.input2, dtype)?;
    ctx.expect_dtype(k.output, DType::Bool)?;
    let supported = match dtype {
        DType::F32 | DType::I32 | DType::I64 | DType::I8 | DType::U8 => true,
        DType::Bool => is_equality(op.opcode),
        _ => false,
    };
    if !supported {
        return Err(RuntimeError::UnsupportedType {
            op: op.opcode,
            dtype,
        });
    }
    if matches!(dtype, DType::I8 | DType::U8) {
        let q1 = ctx.descriptor(k.input1)?.quant_params();
        let q2 = ctx.descriptor(k.input2)?.quant_params();
        if q1 != q2 {
            return Err(RuntimeError::QuantizationMismatch(format!(
                "{} operands have quantization {q1:?} and {q2:?}",
                op.opcode
            )));
        }
    }

    if ctx.is_dynamic(k.input1) || ctx.is_dynamic(k.input2) {
        ctx.mark_dynamic(k.output)?;
    } else if !ctx.is_dynamic(k.output) {
        let shape = Shape::broadcast_shape(ctx.shape(k.input1)?, ctx.shape(k.input2)?)?;
        ctx.expect_shape(k.output, &shape)?;
    }
    Ok(OpData::None)
}

fn execute(ctx: &mut ExecutionContext<'_>, op: &Operator, _data: &OpData) -> Result<()> {
    let k = TisoKernel::new(op)?;
    if ctx.is_dynamic(k.output) {
        let shape = Shape::broadcast_shape(ctx.shape(k.input1)?, ctx.shape(k.input2)?)?;
        prepare_output(ctx, k.output, shape)?;
    }
    let d = k.read_data(ctx)?;
    match d.input1.dtype {
        DType::F32 => compare::<f32>(op.opcode, d),
        DType::I32 => compare::<i32>(op.opcode, d),
        DType::I64 => compare::<i64>(op.opcode, d),
        DType::I8 => compare::<i8>(op.opcode, d),
        DType::U8 | DType::Bool => compare::<u8>(op.opcode, d),
        dtype => Err(RuntimeError::UnsupportedType {
            op: op.opcode,
            dtype,
        }),
    }
}

fn compare<T: Element>(op: OpCode, d: TisoData<'_>) -> Result<()> {
    let a = d.input1.slice::<T>()?;
    let b = d.input2.slice::<T>()?;
    let (a_shape, b_shape, out_shape) = (d.input1.shape, d.input2.shape, d.output.shape);
    let out = d.output.into_typed::<u8>()?;
    let f: fn(&T, &T) -> bool = match op {
        OpCode::Less => |x, y| x < y,
        OpCode::Greater => |x, y| x > y,
        OpCode::Equal => |x, y| x == y,
        OpCode::NotEqual => |x, y| x != y,
        other => {
            return Err(RuntimeError::invariant(format!(
                "{other} is not a comparison"
            )))
        }
    };
    binary_map(a, a_shape, b, b_shape, out, out_shape, |x, y| f(&x, &y) as u8)
}
