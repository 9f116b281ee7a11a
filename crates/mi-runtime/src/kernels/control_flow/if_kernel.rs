use log::trace;
use mi_tensor::DType;

use crate::buffers::InPlaceSupport;
use crate::error::{Result, RuntimeError};
use crate::executor::{ConfigureContext, ExecutionContext};
use crate::graph::{OpCode, OpOptions, Operator};
use crate::kernels::control_flow::{check_arity, check_boundary_input, check_boundary_output, with_teardown};
use crate::kernels::OpData;
use crate::registry::KernelRegistration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IfData {
    pub then_subgraph: usize,
    pub else_subgraph: usize,
}

/// Input 0 is the condition; inputs `1..` feed the branch and map one-to-one
/// onto its declared inputs, so output `k` may reuse input `k + 1`.
pub fn register_if() -> KernelRegistration {
    KernelRegistration {
        name: OpCode::If.name(),
        configure,
        execute,
        in_place: InPlaceSupport::Pairwise { input_offset: 1 },
    }
}

fn branches(op: &Operator) -> Result<IfData> {
    match op.options {
        OpOptions::If {
            then_subgraph,
            else_subgraph,
        } => Ok(IfData {
            then_subgraph,
            else_subgraph,
        }),
        _ => Err(RuntimeError::invariant("IF without branch subgraphs")),
    }
}

fn configure(ctx: &mut ConfigureContext<'_>, op: &Operator) -> Result<OpData> {
    let data = branches(op)?;
    let cond = op.required_input(0)?;
    ctx.expect_dtype(cond, DType::Bool)?;
    if !ctx.is_dynamic(cond) && ctx.shape(cond)?.numel() != 1 {
        return Err(RuntimeError::ShapeMismatch {
            tensor: cond,
            expected: vec![1],
            got: ctx.shape(cond)?.dims().to_vec(),
        });
    }
    let inputs = op.inputs.len().saturating_sub(1);
    for branch in [data.then_subgraph, data.else_subgraph] {
        check_arity(ctx, branch, inputs, op.outputs.len())?;
        ctx.configure_subgraph(branch)?;
        let sg = ctx.graph().subgraph(branch)?;
        for (k, &child) in sg.inputs.iter().enumerate() {
            check_boundary_input(ctx, branch, child, op.required_input(k + 1)?)?;
        }
        for (k, &child) in sg.outputs.iter().enumerate() {
            check_boundary_output(ctx, branch, child, op.outputs[k])?;
        }
    }
    Ok(OpData::If(data))
}

fn execute(ctx: &mut ExecutionContext<'_>, op: &Operator, data: &OpData) -> Result<()> {
    let OpData::If(data) = data else {
        return Err(RuntimeError::invariant("IF kernel without branch data"));
    };
    let cond = op.required_input(0)?;
    let take_then = ctx
        .read(cond)?
        .first()
        .map(|&b| b != 0)
        .ok_or(RuntimeError::MissingBuffer { tensor: cond })?;
    let branch = if take_then {
        data.then_subgraph
    } else {
        data.else_subgraph
    };
    trace!("IF: running subgraph {branch}");
    with_teardown(ctx, branch, |ctx| {
        let graph = ctx.graph();
        let sg = graph.subgraph(branch)?;
        for k in 0..sg.inputs.len() {
            ctx.configure_input(branch, k, op.required_input(k + 1)?)?;
        }
        ctx.execute_subgraph(branch)?;
        for (k, &parent) in op.outputs.iter().enumerate() {
            ctx.copy_output(branch, k, parent)?;
        }
        Ok(())
    })
}
