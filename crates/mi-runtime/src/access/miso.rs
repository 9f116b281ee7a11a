use crate::access::view::{InputView, OutputView};
use crate::buffers::MAX_KERNEL_INPUTS;
use crate::error::{Result, RuntimeError};
use crate::executor::ExecutionContext;
use crate::graph::Operator;

/// Up to four inputs, one output. Positions at or beyond `required` may be
/// absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MisoKernel {
    pub inputs: [Option<usize>; MAX_KERNEL_INPUTS],
    pub count: usize,
    pub output: usize,
}

#[derive(Debug)]
pub struct MisoData<'a> {
    inputs: [Option<InputView<'a>>; MAX_KERNEL_INPUTS],
    pub output: OutputView<'a>,
}

impl<'a> MisoData<'a> {
    pub fn input(&self, position: usize) -> Result<InputView<'a>> {
        self.optional(position)
            .ok_or_else(|| RuntimeError::invariant(format!("input {position} is not bound")))
    }

    pub fn optional(&self, position: usize) -> Option<InputView<'a>> {
        self.inputs.get(position).copied().flatten()
    }
}

impl MisoKernel {
    pub fn new(op: &Operator, required: usize) -> Result<Self> {
        if op.inputs.len() > MAX_KERNEL_INPUTS {
            return Err(RuntimeError::invariant(format!(
                "{} takes at most {MAX_KERNEL_INPUTS} inputs, got {}",
                op.opcode,
                op.inputs.len()
            )));
        }
        let mut inputs = [None; MAX_KERNEL_INPUTS];
        for (position, slot) in inputs.iter_mut().enumerate() {
            *slot = if position < required {
                Some(op.required_input(position)?)
            } else {
                op.input(position)
            };
        }
        Ok(MisoKernel {
            inputs,
            count: op.inputs.len().max(required).min(MAX_KERNEL_INPUTS),
            output: op.required_output(0)?,
        })
    }

    pub fn input(&self, position: usize) -> Option<usize> {
        self.inputs.get(position).copied().flatten()
    }

    pub fn read_data<'a>(&self, ctx: &'a mut ExecutionContext<'_>) -> Result<MisoData<'a>> {
        let views = ctx.io(&self.inputs[..self.count], self.output)?;
        Ok(MisoData {
            inputs: views.inputs,
            output: views.output,
        })
    }
}
