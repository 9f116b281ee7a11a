//! QUANTIZE (f32 to integer) and DEQUANTIZE (integer or f16 to f32).

use half::f16;
use mi_quant::{dequantize, quantize};
use mi_tensor::{DType, Element, QuantParams};

use crate::access::{prepare_output, SisoData, SisoKernel};
use crate::buffers::InPlaceSupport;
use crate::error::{Result, RuntimeError};
use crate::executor::{ConfigureContext, ExecutionContext};
use crate::graph::{OpCode, Operator};
use crate::kernels::{per_tensor_params, OpData};
use crate::registry::KernelRegistration;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct QuantizeData {
    /// Parameters of the integer side; `None` for f16 dequantization.
    pub params: Option<QuantParams>,
}

pub fn register_quantize() -> KernelRegistration {
    KernelRegistration {
        name: OpCode::Quantize.name(),
        configure: configure_quantize,
        execute: execute_quantize,
        in_place: InPlaceSupport::None,
    }
}

pub fn register_dequantize() -> KernelRegistration {
    KernelRegistration {
        name: OpCode::Dequantize.name(),
        configure: configure_dequantize,
        execute: execute_dequantize,
        in_place: InPlaceSupport::None,
    }
}

fn propagate_shape(ctx: &mut ConfigureContext<'_>, k: &SisoKernel) -> Result<()> {
    if ctx.is_dynamic(k.input) {
        ctx.mark_dynamic(k.output)
    } else if ctx.is_dynamic(k.output) {
        Ok(())
    } else {
        let shape = ctx.shape(k.input)?.clone();
        ctx.expect_shape(k.output, &shape)
    }
}

fn configure_quantize(ctx: &mut ConfigureContext<'_>, op: &Operator) -> Result<OpData> {
    let k = SisoKernel::new(op)?;
    ctx.expect_dtype(k.input, DType::F32)?;
    let dtype = ctx.dtype(k.output)?;
    if !matches!(dtype, DType::I8 | DType::U8 | DType::I16) {
        return Err(RuntimeError::UnsupportedType {
            op: op.opcode,
            dtype,
        });
    }
    let params = per_tensor_params(ctx, k.output)?;
    propagate_shape(ctx, &k)?;
    Ok(OpData::Quantize(QuantizeData {
        params: Some(params),
    }))
}

fn configure_dequantize(ctx: &mut ConfigureContext<'_>, op: &Operator) -> Result<OpData> {
    let k = SisoKernel::new(op)?;
    ctx.expect_dtype(k.output, DType::F32)?;
    let params = match ctx.dtype(k.input)? {
        DType::I8 | DType::U8 | DType::I16 => Some(per_tensor_params(ctx, k.input)?),
        DType::F16 => None,
        dtype => {
            return Err(RuntimeError::UnsupportedType {
                op: op.opcode,
                dtype,
            })
        }
    };
    propagate_shape(ctx, &k)?;
    Ok(OpData::Quantize(QuantizeData { params }))
}

fn params_of(data: &OpData) -> Result<Option<QuantParams>> {
    match data {
        OpData::Quantize(q) => Ok(q.params),
        _ => Err(RuntimeError::invariant("quantize kernel without quantize data")),
    }
}

fn prepare(ctx: &mut ExecutionContext<'_>, k: &SisoKernel) -> Result<()> {
    if ctx.is_dynamic(k.output) {
        let shape = ctx.shape(k.input)?.clone();
        prepare_output(ctx, k.output, shape)?;
    }
    Ok(())
}

fn execute_quantize(ctx: &mut ExecutionContext<'_>, op: &Operator, data: &OpData) -> Result<()> {
    let params = params_of(data)?
        .ok_or_else(|| RuntimeError::invariant("quantize without output parameters"))?;
    let k = SisoKernel::new(op)?;
    prepare(ctx, &k)?;
    let d = k.read_data(ctx)?;
    let dtype = d.output.dtype;
    match dtype {
        DType::I8 => quantize_into::<i8>(d, params, dtype, |q| q as i8),
        DType::U8 => quantize_into::<u8>(d, params, dtype, |q| q as u8),
        DType::I16 => quantize_into::<i16>(d, params, dtype, |q| q as i16),
        dtype => Err(RuntimeError::UnsupportedType {
            op: op.opcode,
            dtype,
        }),
    }
}

/// `q = clamp(round(x / scale) + zero_point)`; `narrow` only ever sees values
/// already saturated to the output range.
fn quantize_into<T: Element>(
    d: SisoData<'_>,
    params: QuantParams,
    dtype: DType,
    narrow: impl Fn(i32) -> T,
) -> Result<()> {
    let x = d.input.slice::<f32>()?;
    let out = d.output.into_typed::<T>()?;
    for (o, &v) in out.iter_mut().zip(x) {
        *o = narrow(quantize(v, params, dtype)?);
    }
    Ok(())
}

fn execute_dequantize(ctx: &mut ExecutionContext<'_>, op: &Operator, data: &OpData) -> Result<()> {
    let params = params_of(data)?;
    let k = SisoKernel::new(op)?;
    prepare(ctx, &k)?;
    let d = k.read_data(ctx)?;
    match (d.input.dtype, params) {
        (DType::I8, Some(p)) => dequantize_from::<i8>(d, |q| dequantize(q as i32, p)),
        (DType::U8, Some(p)) => dequantize_from::<u8>(d, |q| dequantize(q as i32, p)),
        (DType::I16, Some(p)) => dequantize_from::<i16>(d, |q| dequantize(q as i32, p)),
        (DType::F16, _) => dequantize_from::<f16>(d, f16::to_f32),
        (dtype, _) => Err(RuntimeError::UnsupportedType {
            op: op.opcode,
            dtype,
        }),
    }
}

fn dequantize_from<T: Element>(d: SisoData<'_>, f: impl Fn(T) -> f32) -> Result<()> {
    let x = d.input.slice::<T>()?;
    let out = d.output.into_typed::<f32>()?;
    for (o, &v) in out.iter_mut().zip(x) {
        *o = f(v);
    }
    Ok(())
}
