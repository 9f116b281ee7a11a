//! SLICE: extracts `size[d]` elements from `begin[d]` along each axis.
//!
//! A size of `-1` takes everything from `begin` to the end of the axis.
//! Non-constant begin or size tensors make the output dynamic.

use mi_tensor::Shape;

use crate::access::{prepare_output, MisoKernel};
use crate::buffers::InPlaceSupport;
use crate::error::{Result, RuntimeError};
use crate::executor::{ConfigureContext, ExecutionContext};
use crate::graph::{OpCode, Operator};
use crate::kernels::{expect_vector, index_values, OpData};
use crate::registry::KernelRegistration;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SliceData {
    /// Resolved window, `None` when it is known only at execute.
    pub window: Option<Window>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub begin: Vec<usize>,
    pub shape: Shape,
}

pub fn register_slice() -> KernelRegistration {
    KernelRegistration {
        name: OpCode::Slice.name(),
        configure,
        execute,
        in_place: InPlaceSupport::None,
    }
}

/// Validates `begin`/`size` against `input` and returns the window.
pub fn resolve_window(input: &Shape, begin: &[i64], size: &[i64]) -> Result<Window> {
    let rank = input.ndim();
    if begin.len() != rank || size.len() != rank {
        return Err(RuntimeError::InvalidShape(format!(
            "slice of rank-{rank} input needs {rank} begin and size entries, got {} and {}",
            begin.len(),
            size.len()
        )));
    }
    let mut starts = Vec::with_capacity(rank);
    let mut dims = Vec::with_capacity(rank);
    for axis in 0..rank {
        let extent = input.dim(axis) as i64;
        let (b, s) = (begin[axis], size[axis]);
        if b < 0 || b > extent {
            return Err(RuntimeError::InvalidShape(format!(
                "slice begin {b} out of bounds for axis {axis} of {input}"
            )));
        }
        let s = if s == -1 { extent - b } else { s };
        if s < 0 || s > extent - b {
            return Err(RuntimeError::InvalidShape(format!(
                "slice [{b}, {b}+{s}) out of bounds for axis {axis} of {input}"
            )));
        }
        starts.push(b as usize);
        dims.push(s as usize);
    }
    Ok(Window {
        begin: starts,
        shape: Shape::new(dims),
    })
}

fn configure(ctx: &mut ConfigureContext<'_>, op: &Operator) -> Result<OpData> {
    let k = MisoKernel::new(op, 3)?;
    let (input, begin, size) = (op.required_input(0)?, op.required_input(1)?, op.required_input(2)?);
    let dtype = ctx.dtype(input)?;
    ctx.expect_dtype(k.output, dtype)?;
    expect_vector(ctx, begin)?;
    expect_vector(ctx, size)?;

    let constants = (ctx.constant_data(begin), ctx.constant_data(size));
    let (Some(begin_bytes), Some(size_bytes)) = constants else {
        ctx.mark_dynamic(k.output)?;
        return Ok(OpData::Slice(SliceData::default()));
    };
    if ctx.is_dynamic(input) {
        ctx.mark_dynamic(k.output)?;
        return Ok(OpData::Slice(SliceData::default()));
    }
    let begin = index_values(begin_bytes, ctx.dtype(begin)?, begin)?;
    let size = index_values(size_bytes, ctx.dtype(size)?, size)?;
    let window = resolve_window(ctx.shape(input)?, &begin, &size)?;
    if ctx.is_dynamic(k.output) {
        return Ok(OpData::Slice(SliceData::default()));
    }
    ctx.expect_shape(k.output, &window.shape)?;
    Ok(OpData::Slice(SliceData {
        window: Some(window),
    }))
}

fn execute(ctx: &mut ExecutionContext<'_>, op: &Operator, data: &OpData) -> Result<()> {
    let OpData::Slice(params) = data else {
        return Err(RuntimeError::invariant("slice kernel without slice data"));
    };
    let k = MisoKernel::new(op, 3)?;
    let input = op.required_input(0)?;
    let window = match &params.window {
        Some(window) => window.clone(),
        None => {
            let (begin, size) = (op.required_input(1)?, op.required_input(2)?);
            let b = index_values(ctx.read(begin)?, ctx.dtype(begin)?, begin)?;
            let s = index_values(ctx.read(size)?, ctx.dtype(size)?, size)?;
            let window = resolve_window(ctx.shape(input)?, &b, &s)?;
            prepare_output(ctx, k.output, window.shape.clone())?;
            window
        }
    };
    let d = k.read_data(ctx)?;
    let source = d.input(0)?;
    let src = source.raw()?;
    let width = source.dtype.size_in_bytes();
    gather(src, source.shape, &window, width, d.output.bytes)
}

/// Copies the window out of `src` row by row along the innermost axis.
fn gather(src: &[u8], input: &Shape, window: &Window, width: usize, out: &mut [u8]) -> Result<()> {
    let numel = window.shape.numel();
    if out.len() != numel * width || src.len() != input.numel() * width {
        return Err(RuntimeError::invariant("slice buffers have the wrong size"));
    }
    if numel == 0 {
        return Ok(());
    }
    let rank = input.ndim();
    if rank == 0 {
        out.copy_from_slice(src);
        return Ok(());
    }
    let strides = input.strides();
    let row = window.shape.dim(rank - 1) * width;
    let rows = numel / window.shape.dim(rank - 1);
    let mut counters = vec![0usize; rank - 1];
    for r in 0..rows {
        let mut offset = window.begin[rank - 1];
        for axis in 0..rank - 1 {
            offset += (window.begin[axis] + counters[axis]) * strides[axis];
        }
        let start = offset * width;
        out[r * row..(r + 1) * row].copy_from_slice(&src[start..start + row]);
        for axis in (0..rank - 1).rev() {
            counters[axis] += 1;
            if counters[axis] < window.shape.dim(axis) {
                break;
            }
            counters[axis] = 0;
        }
    }
    Ok(())
}
