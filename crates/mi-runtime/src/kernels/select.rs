//! SELECT_V2: `out = cond ? x : y` with three-way broadcasting.

use mi_tensor::{DType, Shape};

use crate::access::{prepare_output, BroadcastPlan, MisoKernel};
use crate::buffers::InPlaceSupport;
use crate::error::{Result, RuntimeError};
use crate::executor::{ConfigureContext, ExecutionContext};
use crate::graph::{OpCode, Operator};
use crate::kernels::OpData;
use crate::registry::KernelRegistration;

pub fn register_select() -> KernelRegistration {
    KernelRegistration {
        name: OpCode::Select.name(),
        configure,
        execute,
        in_place: InPlaceSupport::None,
    }
}

fn output_shape(cond: &Shape, x: &Shape, y: &Shape) -> Result<Shape> {
    Ok(Shape::broadcast_shape(cond, &Shape::broadcast_shape(x, y)?)?)
}

fn configure(ctx: &mut ConfigureContext<'_>, op: &Operator) -> Result<OpData> {
    let k = MisoKernel::new(op, 3)?;
    let (cond, x, y) = (op.required_input(0)?, op.required_input(1)?, op.required_input(2)?);
    ctx.expect_dtype(cond, DType::Bool)?;
    let dtype = ctx.dtype(x)?;
    ctx.expect_dtype(y, dtype)?;
    ctx.expect_dtype(k.output, dtype)?;
    if !matches!(
        dtype,
        DType::F32 | DType::I8 | DType::I16 | DType::I32 | DType::I64 | DType::U8 | DType::Bool
    ) {
        return Err(RuntimeError::UnsupportedType {
            op: op.opcode,
            dtype,
        });
    }
    if ctx.is_dynamic(cond) || ctx.is_dynamic(x) || ctx.is_dynamic(y) {
        ctx.mark_dynamic(k.output)?;
    } else if !ctx.is_dynamic(k.output) {
        let shape = output_shape(ctx.shape(cond)?, ctx.shape(x)?, ctx.shape(y)?)?;
        ctx.expect_shape(k.output, &shape)?;
    }
    Ok(OpData::None)
}

fn execute(ctx: &mut ExecutionContext<'_>, op: &Operator, _data: &OpData) -> Result<()> {
    let k = MisoKernel::new(op, 3)?;
    if ctx.is_dynamic(k.output) {
        let (cond, x, y) = (op.required_input(0)?, op.required_input(1)?, op.required_input(2)?);
        let shape = output_shape(ctx.shape(cond)?, ctx.shape(x)?, ctx.shape(y)?)?;
        prepare_output(ctx, k.output, shape)?;
    }
    let d = k.read_data(ctx)?;
    let (cond, x, y) = (d.input(0)?, d.input(1)?, d.input(2)?);
    let flags = cond.slice::<u8>()?;
    let (xs, ys) = (x.raw()?, y.raw()?);
    let width = d.output.dtype.size_in_bytes();
    let plan = BroadcastPlan::new([cond.shape, x.shape, y.shape], d.output.shape)?;
    let out = d.output.bytes;
    if out.len() != plan.numel() * width {
        return Err(RuntimeError::invariant("select output buffer has the wrong size"));
    }
    plan.for_each(|o, [c, i, j]| {
        let (src, at) = if flags[c] != 0 { (xs, i) } else { (ys, j) };
        out[o * width..(o + 1) * width].copy_from_slice(&src[at * width..(at + 1) * width]);
    });
    Ok(())
}
