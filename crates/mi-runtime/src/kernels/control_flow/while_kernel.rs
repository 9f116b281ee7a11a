use log::trace;
use mi_tensor::DType;

use crate::buffers::InPlaceSupport;
use crate::error::{Result, RuntimeError};
use crate::executor::{ConfigureContext, ExecutionContext};
use crate::graph::{OpCode, OpOptions, Operator};
use crate::kernels::control_flow::{check_arity, check_boundary_input, with_teardown};
use crate::kernels::OpData;
use crate::registry::KernelRegistration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WhileData {
    pub cond_subgraph: usize,
    pub body_subgraph: usize,
}

/// Loop state lives in the operator's outputs: output `k` carries state
/// `k` between iterations and may reuse input `k` as its buffer.
pub fn register_while() -> KernelRegistration {
    KernelRegistration {
        name: OpCode::While.name(),
        configure,
        execute,
        in_place: InPlaceSupport::Pairwise { input_offset: 0 },
    }
}

fn subgraphs(op: &Operator) -> Result<WhileData> {
    match op.options {
        OpOptions::While {
            cond_subgraph,
            body_subgraph,
        } => Ok(WhileData {
            cond_subgraph,
            body_subgraph,
        }),
        _ => Err(RuntimeError::invariant("WHILE without cond and body subgraphs")),
    }
}

fn configure(ctx: &mut ConfigureContext<'_>, op: &Operator) -> Result<OpData> {
    let data = subgraphs(op)?;
    let n = op.inputs.len();
    if op.outputs.len() != n {
        return Err(RuntimeError::invariant(format!(
            "WHILE has {n} inputs but {} outputs",
            op.outputs.len()
        )));
    }
    check_arity(ctx, data.cond_subgraph, n, 1)?;
    check_arity(ctx, data.body_subgraph, n, n)?;
    ctx.configure_subgraph(data.cond_subgraph)?;
    ctx.configure_subgraph(data.body_subgraph)?;

    let graph = ctx.graph();
    let cond = graph.subgraph(data.cond_subgraph)?;
    let body = graph.subgraph(data.body_subgraph)?;
    let flag = cond.outputs[0];
    let cond_buffers = ctx.buffers_of(data.cond_subgraph)?;
    let flag_dtype = cond_buffers.dtype(flag)?;
    if flag_dtype != DType::Bool {
        return Err(RuntimeError::TypeMismatch {
            tensor: flag,
            expected: DType::Bool,
            got: flag_dtype,
        });
    }
    if !cond_buffers.is_dynamic(flag) && cond_buffers.shape(flag)?.numel() != 1 {
        return Err(RuntimeError::ShapeMismatch {
            tensor: flag,
            expected: vec![1],
            got: cond_buffers.shape(flag)?.dims().to_vec(),
        });
    }

    for k in 0..n {
        let (input, output) = (op.required_input(k)?, op.outputs[k]);
        if ctx.is_dynamic(input) || ctx.is_dynamic(output) {
            return Err(RuntimeError::InvalidShape(format!(
                "WHILE state {k} must be statically shaped"
            )));
        }
        let shape = ctx.shape(input)?.clone();
        ctx.expect_dtype(output, ctx.dtype(input)?)?;
        ctx.expect_shape(output, &shape)?;
        check_boundary_input(ctx, data.cond_subgraph, cond.inputs[k], output)?;
        check_boundary_input(ctx, data.body_subgraph, body.inputs[k], output)?;
        let body_buffers = ctx.buffers_of(data.body_subgraph)?;
        let body_out = body.outputs[k];
        let got = body_buffers.dtype(body_out)?;
        ctx.expect_dtype(output, got)?;
        if !body_buffers.is_dynamic(body_out) && body_buffers.shape(body_out)? != &shape {
            return Err(RuntimeError::ShapeMismatch {
                tensor: body_out,
                expected: shape.dims().to_vec(),
                got: body_buffers.shape(body_out)?.dims().to_vec(),
            });
        }
    }
    Ok(OpData::While(data))
}

fn execute(ctx: &mut ExecutionContext<'_>, op: &Operator, data: &OpData) -> Result<()> {
    let OpData::While(data) = data else {
        return Err(RuntimeError::invariant("WHILE kernel without loop data"));
    };
    let WhileData {
        cond_subgraph,
        body_subgraph,
    } = *data;
    for (k, &output) in op.outputs.iter().enumerate() {
        ctx.copy_tensor(op.required_input(k)?, output)?;
    }

    let limit = ctx.config().max_while_iterations;
    let mut iterations = 0u32;
    loop {
        let keep_going = with_teardown(ctx, cond_subgraph, |ctx| {
            for (k, &state) in op.outputs.iter().enumerate() {
                ctx.configure_input(cond_subgraph, k, state)?;
            }
            ctx.execute_subgraph(cond_subgraph)?;
            ctx.read_bool_output(cond_subgraph, 0)
        })?;
        if !keep_going {
            break;
        }
        if let Some(limit) = limit {
            if iterations >= limit {
                return Err(RuntimeError::IterationLimit { limit });
            }
        }
        trace!("WHILE: iteration {iterations}");
        with_teardown(ctx, body_subgraph, |ctx| {
            for (k, &state) in op.outputs.iter().enumerate() {
                ctx.configure_input(body_subgraph, k, state)?;
            }
            ctx.execute_subgraph(body_subgraph)?;
            for (k, &state) in op.outputs.iter().enumerate() {
                ctx.copy_output(body_subgraph, k, state)?;
            }
            Ok(())
        })?;
        iterations = iterations.saturating_add(1);
    }
    trace!("WHILE: finished after {iterations} iterations");
    Ok(())
}
