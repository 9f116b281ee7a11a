//! FULLY_CONNECTED: `out[b, u] = act(sum_d x[b, d] * w[u, d] + bias[u])`.
//!
//! Float and int8 paths; int8 filters may be quantized per tensor or per
//! output unit.

use mi_quant::FusedActivation;
use mi_tensor::{DType, Shape};

use crate::access::{prepare_output, MisoData, MisoKernel};
use crate::buffers::InPlaceSupport;
use crate::error::{Result, RuntimeError};
use crate::executor::{ConfigureContext, ExecutionContext};
use crate::graph::{OpCode, OpOptions, Operator};
use crate::kernels::{OpData, QuantizedAccumulation};
use crate::registry::KernelRegistration;

#[derive(Debug, Clone, PartialEq)]
pub struct FullyConnectedData {
    pub activation: FusedActivation,
    pub keep_num_dims: bool,
    pub depth: usize,
    pub units: usize,
    pub quantized: Option<QuantizedAccumulation>,
}

pub fn register_fully_connected() -> KernelRegistration {
    KernelRegistration {
        name: OpCode::FullyConnected.name(),
        configure,
        execute,
        in_place: InPlaceSupport::None,
    }
}

fn options(op: &Operator) -> (FusedActivation, bool) {
    match op.options {
        OpOptions::FullyConnected {
            activation,
            keep_num_dims,
        } => (activation, keep_num_dims),
        _ => (FusedActivation::None, false),
    }
}

/// Output shape for `input` against a `[units, depth]` filter.
pub fn output_shape(input: &Shape, depth: usize, units: usize, keep_num_dims: bool) -> Result<Shape> {
    if depth == 0 || input.numel() % depth != 0 {
        return Err(RuntimeError::InvalidShape(format!(
            "input {input} is not a whole number of rows of depth {depth}"
        )));
    }
    if keep_num_dims {
        if input.ndim() == 0 || input.dim(input.ndim() - 1) != depth {
            return Err(RuntimeError::InvalidShape(format!(
                "input {input} must end in depth {depth} to keep its dimensions"
            )));
        }
        let mut dims = input.dims().to_vec();
        if let Some(last) = dims.last_mut() {
            *last = units;
        }
        return Ok(Shape::new(dims));
    }
    Ok(Shape::from([input.numel() / depth, units]))
}

fn configure(ctx: &mut ConfigureContext<'_>, op: &Operator) -> Result<OpData> {
    let k = MisoKernel::new(op, 2)?;
    let (input, filter) = (op.required_input(0)?, op.required_input(1)?);
    let bias = op.input(2);
    let (activation, keep_num_dims) = options(op);

    let dtype = ctx.dtype(input)?;
    ctx.expect_dtype(filter, dtype)?;
    ctx.expect_dtype(k.output, dtype)?;
    let bias_dtype = match dtype {
        DType::F32 => DType::F32,
        DType::I8 => DType::I32,
        other => {
            return Err(RuntimeError::UnsupportedType {
                op: op.opcode,
                dtype: other,
            })
        }
    };

    let filter_shape = ctx.shape(filter)?;
    if filter_shape.ndim() != 2 {
        return Err(RuntimeError::InvalidShape(format!(
            "filter must be [units, depth], got {filter_shape}"
        )));
    }
    let (units, depth) = (filter_shape.dim(0), filter_shape.dim(1));
    if let Some(bias) = bias {
        ctx.expect_dtype(bias, bias_dtype)?;
        ctx.expect_shape(bias, &Shape::from([units]))?;
    }

    if ctx.is_dynamic(input) {
        ctx.mark_dynamic(k.output)?;
    } else {
        let shape = output_shape(ctx.shape(input)?, depth, units, keep_num_dims)?;
        if !ctx.is_dynamic(k.output) {
            ctx.expect_shape(k.output, &shape)?;
        }
    }

    let quantized = match dtype {
        DType::I8 => Some(QuantizedAccumulation::configure(
            ctx,
            op,
            (input, filter, k.output),
            units,
            activation,
        )?),
        _ => None,
    };
    Ok(OpData::FullyConnected(FullyConnectedData {
        activation,
        keep_num_dims,
        depth,
        units,
        quantized,
    }))
}

fn execute(ctx: &mut ExecutionContext<'_>, op: &Operator, data: &OpData) -> Result<()> {
    let OpData::FullyConnected(params) = data else {
        return Err(RuntimeError::invariant("fully-connected kernel without its data"));
    };
    let k = MisoKernel::new(op, 2)?;
    if ctx.is_dynamic(k.output) {
        let shape = output_shape(
            ctx.shape(op.required_input(0)?)?,
            params.depth,
            params.units,
            params.keep_num_dims,
        )?;
        prepare_output(ctx, k.output, shape)?;
    }
    let d = k.read_data(ctx)?;
    match (d.output.dtype, &params.quantized) {
        (DType::F32, _) => run_f32(d, params),
        (DType::I8, Some(q)) => run_i8(d, params, q),
        (dtype, _) => Err(RuntimeError::UnsupportedType {
            op: op.opcode,
            dtype,
        }),
    }
}

fn run_f32(d: MisoData<'_>, params: &FullyConnectedData) -> Result<()> {
    let x = d.input(0)?.slice::<f32>()?;
    let w = d.input(1)?.slice::<f32>()?;
    let bias = d.optional(2).map(|b| b.slice::<f32>()).transpose()?;
    let out = d.output.into_typed::<f32>()?;
    let (depth, units) = (params.depth, params.units);
    check_sizes(x.len(), w.len(), out.len(), depth, units)?;
    if units == 0 {
        return Ok(());
    }
    for (row, out_row) in x.chunks_exact(depth).zip(out.chunks_exact_mut(units)) {
        for (u, o) in out_row.iter_mut().enumerate() {
            let weights = &w[u * depth..(u + 1) * depth];
            let mut acc: f32 = row.iter().zip(weights).map(|(a, b)| a * b).sum();
            if let Some(bias) = bias {
                acc += bias[u];
            }
            *o = params.activation.apply(acc);
        }
    }
    Ok(())
}

fn run_i8(d: MisoData<'_>, params: &FullyConnectedData, q: &QuantizedAccumulation) -> Result<()> {
    let x = d.input(0)?.slice::<i8>()?;
    let w = d.input(1)?.slice::<i8>()?;
    let bias = d.optional(2).map(|b| b.slice::<i32>()).transpose()?;
    let out = d.output.into_typed::<i8>()?;
    let (depth, units) = (params.depth, params.units);
    check_sizes(x.len(), w.len(), out.len(), depth, units)?;
    if units == 0 {
        return Ok(());
    }
    let (input_offset, filter_offset) = (q.input_offset.value(), q.filter_offset.value());
    for (row, out_row) in x.chunks_exact(depth).zip(out.chunks_exact_mut(units)) {
        for (u, o) in out_row.iter_mut().enumerate() {
            let weights = &w[u * depth..(u + 1) * depth];
            let mut acc: i32 = row
                .iter()
                .zip(weights)
                .map(|(&a, &b)| (a as i32 + input_offset) * (b as i32 + filter_offset))
                .sum();
            if let Some(bias) = bias {
                acc += bias[u];
            }
            *o = q.requantize(acc, u) as i8;
        }
    }
    Ok(())
}

fn check_sizes(x: usize, w: usize, out: usize, depth: usize, units: usize) -> Result<()> {
    if depth == 0 || w != depth * units || x % depth != 0 || out != (x / depth) * units {
        return Err(RuntimeError::invariant(format!(
            "fully-connected buffers of {x}, {w} and {out} elements do not fit depth {depth} and {units} units"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_shape() {
        let input = Shape::from([2, 3, 4]);
        assert_eq!(output_shape(&input, 4, 5, false).unwrap(), Shape::from([6, 5]));
        assert_eq!(output_shape(&input, 4, 5, true).unwrap(), Shape::from([2, 3, 5]));
        assert_eq!(output_shape(&input, 12, 1, false).unwrap(), Shape::from([2, 1]));
        assert!(output_shape(&input, 5, 1, false).is_err());
        assert!(output_shape(&input, 12, 1, true).is_err());
    }
}
