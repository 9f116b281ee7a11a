use crate::access::view::{InputView, OutputView};
use crate::error::{Result, RuntimeError};
use crate::executor::ExecutionContext;
use crate::graph::Operator;

/// One input, one output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SisoKernel {
    pub input: usize,
    pub output: usize,
}

#[derive(Debug)]
pub struct SisoData<'a> {
    pub input: InputView<'a>,
    pub output: OutputView<'a>,
}

impl SisoKernel {
    pub fn new(op: &Operator) -> Result<Self> {
        Ok(SisoKernel {
            input: op.required_input(0)?,
            output: op.required_output(0)?,
        })
    }

    /// # Errors
    ///
    /// `MissingBuffer` if the input has no data bound in this pass.
    pub fn read_data<'a>(&self, ctx: &'a mut ExecutionContext<'_>) -> Result<SisoData<'a>> {
        let mut views = ctx.io(&[Some(self.input)], self.output)?;
        let input = views.inputs[0]
            .take()
            .ok_or(RuntimeError::MissingBuffer { tensor: self.input })?;
        Ok(SisoData {
            input,
            output: views.output,
        })
    }
}
