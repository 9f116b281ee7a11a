use crate::error::{Result, RuntimeError};
use crate::graph::opcode::OpCode;
use crate::graph::options::OpOptions;

/// An immutable operator descriptor.
///
/// Inputs are optional per position; outputs are always present.
#[derive(Debug, Clone, PartialEq)]
pub struct Operator {
    pub opcode: OpCode,
    pub inputs: Vec<Option<usize>>,
    pub outputs: Vec<usize>,
    pub options: OpOptions,
}

impl Operator {
    pub fn new(opcode: OpCode, inputs: &[usize], outputs: &[usize]) -> Self {
        Operator {
            opcode,
            inputs: inputs.iter().copied().map(Some).collect(),
            outputs: outputs.to_vec(),
            options: OpOptions::None,
        }
    }

    /// Builds an operator from loader indices, where `-1` marks an absent
    /// input.
    pub fn from_raw(
        opcode: OpCode,
        inputs: &[i32],
        outputs: &[i32],
        options: OpOptions,
    ) -> Result<Self> {
        let inputs = inputs
            .iter()
            .map(|&i| match i {
                -1 => Ok(None),
                i if i >= 0 => Ok(Some(i as usize)),
                i => Err(RuntimeError::invariant(format!("invalid input index {i}"))),
            })
            .collect::<Result<Vec<_>>>()?;
        let outputs = outputs
            .iter()
            .map(|&o| {
                usize::try_from(o)
                    .map_err(|_| RuntimeError::invariant(format!("invalid output index {o}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Operator {
            opcode,
            inputs,
            outputs,
            options,
        })
    }

    pub fn with_options(mut self, options: OpOptions) -> Self {
        self.options = options;
        self
    }

    /// Input tensor at `position`, `None` if absent or out of range.
    pub fn input(&self, position: usize) -> Option<usize> {
        self.inputs.get(position).copied().flatten()
    }

    /// Input tensor at `position`, failing if it is absent.
    pub fn required_input(&self, position: usize) -> Result<usize> {
        self.input(position).ok_or(RuntimeError::MissingTensor {
            op: self.opcode,
            position,
        })
    }

    pub fn required_output(&self, position: usize) -> Result<usize> {
        self.outputs
            .get(position)
            .copied()
            .ok_or(RuntimeError::MissingTensor {
                op: self.opcode,
                position,
            })
    }
}
