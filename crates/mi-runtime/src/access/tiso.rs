use crate::access::broadcast::BroadcastKind;
use crate::access::view::{InputView, OutputView};
use crate::error::{Result, RuntimeError};
use crate::executor::ExecutionContext;
use crate::graph::Operator;

/// Two inputs, one output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TisoKernel {
    pub input1: usize,
    pub input2: usize,
    pub output: usize,
}

#[derive(Debug)]
pub struct TisoData<'a> {
    pub input1: InputView<'a>,
    pub input2: InputView<'a>,
    pub output: OutputView<'a>,
}

impl TisoData<'_> {
    /// Picks the fast path for the current shapes.
    pub fn broadcast_kind(&self) -> BroadcastKind {
        BroadcastKind::classify(self.input1.shape, self.input2.shape, self.output.shape)
    }
}

impl TisoKernel {
    pub fn new(op: &Operator) -> Result<Self> {
        Ok(TisoKernel {
            input1: op.required_input(0)?,
            input2: op.required_input(1)?,
            output: op.required_output(0)?,
        })
    }

    pub fn read_data<'a>(&self, ctx: &'a mut ExecutionContext<'_>) -> Result<TisoData<'a>> {
        let mut views = ctx.io(&[Some(self.input1), Some(self.input2)], self.output)?;
        let input1 = views.inputs[0]
            .take()
            .ok_or(RuntimeError::MissingBuffer { tensor: self.input1 })?;
        let input2 = views.inputs[1]
            .take()
            .ok_or(RuntimeError::MissingBuffer { tensor: self.input2 })?;
        Ok(TisoData {
            input1,
            input2,
            output: views.output,
        })
    }
}
