use mi_tensor::{Tensor, TensorDescriptor};

use crate::graph::operator::Operator;
use crate::graph::{Subgraph, TensorSpec};

/// Incremental construction of a [`Subgraph`], for loaders and tests.
#[derive(Debug, Default)]
pub struct SubgraphBuilder {
    subgraph: Subgraph,
}

impl SubgraphBuilder {
    pub fn new() -> Self {
        SubgraphBuilder::default()
    }

    /// Adds a tensor without data and returns its index.
    pub fn tensor(&mut self, descriptor: TensorDescriptor) -> usize {
        self.subgraph.tensors.push(TensorSpec {
            descriptor,
            data: None,
        });
        self.subgraph.tensors.len() - 1
    }

    /// Adds a constant tensor owned by the graph.
    pub fn constant(&mut self, tensor: Tensor) -> usize {
        let (descriptor, data) = tensor.into_parts();
        self.subgraph.tensors.push(TensorSpec {
            descriptor,
            data: Some(data.into_shared()),
        });
        self.subgraph.tensors.len() - 1
    }

    /// Adds a tensor and declares it as the next subgraph input.
    pub fn input(&mut self, descriptor: TensorDescriptor) -> usize {
        let index = self.tensor(descriptor);
        self.subgraph.inputs.push(index);
        index
    }

    /// Declares an existing tensor as the next subgraph output.
    pub fn output(&mut self, tensor: usize) -> &mut Self {
        self.subgraph.outputs.push(tensor);
        self
    }

    pub fn op(&mut self, op: Operator) -> &mut Self {
        self.subgraph.operators.push(op);
        self
    }

    pub fn build(self) -> Subgraph {
        self.subgraph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::OpCode;
    use mi_tensor::DType;

    #[test]
    fn test_builder_records_io() {
        let mut b = SubgraphBuilder::new();
        let x = b.input(TensorDescriptor::new(DType::F32, [3]));
        let c = b.constant(Tensor::from_slice(&[1.0f32, 2.0, 3.0], [3]).unwrap());
        let y = b.tensor(TensorDescriptor::new(DType::F32, [3]));
        b.op(Operator::new(OpCode::Add, &[x, c], &[y])).output(y);
        let sg = b.build();
        assert_eq!(sg.inputs, vec![x]);
        assert_eq!(sg.outputs, vec![y]);
        assert!(sg.tensors[c].data.is_some());
        assert_eq!(sg.operators.len(), 1);
    }
}
