//! IF and WHILE, the kernels that run nested subgraphs.
//!
//! Configure checks that every nested subgraph's declared inputs and outputs
//! line up one-to-one with the parent tensors wired to them. Execute copies
//! data across the boundary, runs the nested subgraph and always tears down
//! its per-pass state before returning.

mod if_kernel;
mod while_kernel;

pub use if_kernel::{register_if, IfData};
pub use while_kernel::{register_while, WhileData};

use mi_tensor::DType;

use crate::error::{Result, RuntimeError};
use crate::executor::{ConfigureContext, ExecutionContext};

/// Runs `f` against `subgraph`, then releases the subgraph's per-pass state
/// whether or not `f` succeeded.
pub(crate) fn with_teardown<R>(
    ctx: &mut ExecutionContext<'_>,
    subgraph: usize,
    f: impl FnOnce(&mut ExecutionContext<'_>) -> Result<R>,
) -> Result<R> {
    let result = f(ctx);
    let reset = ctx.reset_subgraph(subgraph);
    let value = result?;
    reset?;
    Ok(value)
}

/// Checks that `child_tensor` of `child` can receive `parent_tensor` of the
/// active subgraph. A dynamic parent is checked again at execute.
pub(crate) fn check_boundary_input(
    ctx: &ConfigureContext<'_>,
    child: usize,
    child_tensor: usize,
    parent_tensor: usize,
) -> Result<()> {
    let child_buffers = ctx.buffers_of(child)?;
    let expected = child_buffers.dtype(child_tensor)?;
    ctx.expect_dtype(parent_tensor, expected)?;
    if child_buffers.is_dynamic(child_tensor) {
        return Err(RuntimeError::invariant(format!(
            "input tensor {child_tensor} of subgraph {child} cannot be dynamic"
        )));
    }
    if !ctx.is_dynamic(parent_tensor) {
        ctx.expect_shape(parent_tensor, child_buffers.shape(child_tensor)?)?;
    }
    Ok(())
}

/// Checks that `child_tensor` of `child` can be copied into `parent_tensor`
/// of the active subgraph, marking the parent dynamic when its shape cannot
/// be fixed at configure.
pub(crate) fn check_boundary_output(
    ctx: &mut ConfigureContext<'_>,
    child: usize,
    child_tensor: usize,
    parent_tensor: usize,
) -> Result<()> {
    let child_buffers = ctx.buffers_of(child)?;
    let expected: DType = child_buffers.dtype(child_tensor)?;
    let child_dynamic = child_buffers.is_dynamic(child_tensor);
    let same_shape = ctx.shape(parent_tensor)? == child_buffers.shape(child_tensor)?;
    ctx.expect_dtype(parent_tensor, expected)?;
    if (child_dynamic || !same_shape) && !ctx.is_dynamic(parent_tensor) {
        ctx.mark_dynamic(parent_tensor)?;
    }
    Ok(())
}

/// Fails unless `subgraph` declares exactly `inputs` inputs and `outputs`
/// outputs.
pub(crate) fn check_arity(
    ctx: &ConfigureContext<'_>,
    subgraph: usize,
    inputs: usize,
    outputs: usize,
) -> Result<()> {
    let sg = ctx.graph().subgraph(subgraph)?;
    if sg.inputs.len() != inputs || sg.outputs.len() != outputs {
        return Err(RuntimeError::invariant(format!(
            "subgraph {subgraph} declares {} inputs and {} outputs, the operator wires {inputs} and {outputs}",
            sg.inputs.len(),
            sg.outputs.len()
        )));
    }
    Ok(())
}
