//! In-memory graph model handed over by a loader.

pub mod builder;
pub mod opcode;
pub mod operator;
pub mod options;

pub use builder::SubgraphBuilder;
pub use opcode::OpCode;
pub use operator::Operator;
pub use options::{Conv2DOptions, OpOptions, Padding};

use mi_tensor::{SharedBuffer, TensorDescriptor};

use crate::error::{Result, RuntimeError};

/// One entry of a subgraph's tensor table.
#[derive(Debug, Clone)]
pub struct TensorSpec {
    pub descriptor: TensorDescriptor,
    /// Constant data owned by the graph. Never written.
    pub data: Option<SharedBuffer>,
}

/// Ordered operators over a tensor table, with declared inputs and outputs.
#[derive(Debug, Clone, Default)]
pub struct Subgraph {
    pub tensors: Vec<TensorSpec>,
    pub operators: Vec<Operator>,
    pub inputs: Vec<usize>,
    pub outputs: Vec<usize>,
}

impl Subgraph {
    pub fn tensor(&self, index: usize) -> Result<&TensorSpec> {
        self.tensors
            .get(index)
            .ok_or_else(|| RuntimeError::invariant(format!("tensor index {index} out of range")))
    }

    /// Number of operator input positions that read `tensor`.
    pub fn consumer_count(&self, tensor: usize) -> usize {
        self.operators
            .iter()
            .flat_map(|op| op.inputs.iter())
            .filter(|t| **t == Some(tensor))
            .count()
    }

    /// Checks that every tensor index referenced by an operator or by the
    /// declared inputs/outputs exists.
    pub fn check_indices(&self) -> Result<()> {
        let n = self.tensors.len();
        let declared = self.inputs.iter().chain(self.outputs.iter());
        let used = self
            .operators
            .iter()
            .flat_map(|op| op.inputs.iter().flatten().chain(op.outputs.iter()));
        match declared.chain(used).find(|&&t| t >= n) {
            Some(t) => Err(RuntimeError::invariant(format!(
                "tensor index {t} out of range for a table of {n}"
            ))),
            None => Ok(()),
        }
    }
}

/// The subgraph table. Index 0 is the main subgraph.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub subgraphs: Vec<Subgraph>,
}

impl Graph {
    pub fn new(subgraphs: Vec<Subgraph>) -> Self {
        Graph { subgraphs }
    }

    pub fn subgraph(&self, index: usize) -> Result<&Subgraph> {
        self.subgraphs
            .get(index)
            .ok_or_else(|| RuntimeError::invariant(format!("subgraph index {index} out of range")))
    }

    pub fn len(&self) -> usize {
        self.subgraphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subgraphs.is_empty()
    }
}
