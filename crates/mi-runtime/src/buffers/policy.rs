//! In-place eligibility.
//!
//! Kernels only declare which input/output pairs they could alias; whether a
//! pair actually aliases is decided here, once per configure.

use crate::buffers::manager::BufferManager;
use crate::buffers::TensorRole;
use crate::graph::{Operator, Subgraph};

/// Input/output pairs a kernel can compute in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InPlaceSupport {
    #[default]
    None,
    /// Output 0 may reuse input 0.
    FirstInput,
    /// Output 0 may reuse any one input, tried in order.
    AnyInput,
    /// Output `k` may reuse input `k + input_offset`.
    Pairwise { input_offset: usize },
}

impl InPlaceSupport {
    /// Candidate `(input, output)` pairs, grouped by output in order.
    fn candidates(self, op: &Operator) -> Vec<Vec<(usize, usize)>> {
        match self {
            InPlaceSupport::None => Vec::new(),
            InPlaceSupport::FirstInput => match (op.input(0), op.outputs.first()) {
                (Some(i), Some(&o)) => vec![vec![(i, o)]],
                _ => Vec::new(),
            },
            InPlaceSupport::AnyInput => match op.outputs.first() {
                Some(&o) => vec![op.inputs.iter().flatten().map(|&i| (i, o)).collect()],
                None => Vec::new(),
            },
            InPlaceSupport::Pairwise { input_offset } => op
                .outputs
                .iter()
                .enumerate()
                .filter_map(|(k, &o)| op.input(k + input_offset).map(|i| vec![(i, o)]))
                .collect(),
        }
    }
}

/// Whether operator `op`'s `output` may take over the buffer of `input`.
///
/// Holds when both are statically sized arena intermediates of equal byte
/// size, `input` is read exactly once in the subgraph (by this operator), and
/// `input` is not a declared subgraph output.
pub fn can_alias(
    subgraph: &Subgraph,
    buffers: &BufferManager,
    op: &Operator,
    input: usize,
    output: usize,
) -> bool {
    if input == output {
        return false;
    }
    let intermediate = |t| matches!(buffers.role(t), Ok(TensorRole::Intermediate));
    if !intermediate(input) || !intermediate(output) {
        return false;
    }
    match (buffers.byte_size(input), buffers.byte_size(output)) {
        (Ok(a), Ok(b)) if a == b && a > 0 => {}
        _ => return false,
    }
    if subgraph.outputs.contains(&input) {
        return false;
    }
    let reads_here = op.inputs.iter().filter(|t| **t == Some(input)).count();
    reads_here == 1 && subgraph.consumer_count(input) == 1
}

/// Chooses the aliased pairs for one operator, at most one input per output
/// and one output per input.
pub(crate) fn decide(
    support: InPlaceSupport,
    subgraph: &Subgraph,
    buffers: &BufferManager,
    op: &Operator,
) -> Vec<(usize, usize)> {
    let mut chosen: Vec<(usize, usize)> = Vec::new();
    for group in support.candidates(op) {
        let pick = group.into_iter().find(|&(input, output)| {
            chosen.iter().all(|&(i, _)| i != input) && can_alias(subgraph, buffers, op, input, output)
        });
        if let Some(pair) = pick {
            chosen.push(pair);
        }
    }
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{OpCode, SubgraphBuilder};
    use mi_tensor::{DType, TensorDescriptor};

    fn desc(n: usize) -> TensorDescriptor {
        TensorDescriptor::new(DType::F32, [n])
    }

    #[test]
    fn test_single_consumer_intermediate_aliases() {
        let mut b = SubgraphBuilder::new();
        let x = b.input(desc(4));
        let t = b.tensor(desc(4));
        let y = b.tensor(desc(4));
        b.op(Operator::new(OpCode::Neg, &[x], &[t]));
        b.op(Operator::new(OpCode::Relu, &[t], &[y]));
        b.output(y);
        let sg = b.build();
        let mgr = BufferManager::new(0, &sg);

        // Declared inputs never alias.
        assert!(!can_alias(&sg, &mgr, &sg.operators[0], x, t));
        assert!(can_alias(&sg, &mgr, &sg.operators[1], t, y));
        assert_eq!(
            decide(InPlaceSupport::FirstInput, &sg, &mgr, &sg.operators[1]),
            vec![(t, y)]
        );
        assert!(decide(InPlaceSupport::None, &sg, &mgr, &sg.operators[1]).is_empty());
    }

    #[test]
    fn test_shared_or_mismatched_inputs_rejected() {
        let mut b = SubgraphBuilder::new();
        let x = b.input(desc(4));
        let t = b.tensor(desc(4));
        let y = b.tensor(desc(4));
        let z = b.tensor(desc(4));
        let small = b.tensor(desc(2));
        b.op(Operator::new(OpCode::Neg, &[x], &[t]));
        b.op(Operator::new(OpCode::Add, &[t, t], &[y]));
        b.op(Operator::new(OpCode::Neg, &[y], &[z]));
        b.op(Operator::new(OpCode::Slice, &[z], &[small]));
        b.output(y).output(small);
        let sg = b.build();
        let mgr = BufferManager::new(0, &sg);

        // Read twice by the same operator.
        assert!(!can_alias(&sg, &mgr, &sg.operators[1], t, y));
        // A declared output must survive the pass.
        assert!(!can_alias(&sg, &mgr, &sg.operators[2], y, z));
        // Byte sizes differ.
        assert!(!can_alias(&sg, &mgr, &sg.operators[3], z, small));
    }

    #[test]
    fn test_any_input_picks_first_eligible() {
        let mut b = SubgraphBuilder::new();
        let x = b.input(desc(4));
        let t = b.tensor(desc(4));
        let y = b.tensor(desc(4));
        b.op(Operator::new(OpCode::Neg, &[x], &[t]));
        b.op(Operator::new(OpCode::Add, &[x, t], &[y]));
        b.output(y);
        let sg = b.build();
        let mgr = BufferManager::new(0, &sg);
        assert_eq!(
            decide(InPlaceSupport::AnyInput, &sg, &mgr, &sg.operators[1]),
            vec![(t, y)]
        );
    }

    #[test]
    fn test_pairwise_candidates() {
        let op = Operator::new(OpCode::If, &[0, 1, 2], &[3, 4]);
        let groups = InPlaceSupport::Pairwise { input_offset: 1 }.candidates(&op);
        assert_eq!(groups, vec![vec![(1, 3)], vec![(2, 4)]]);
    }
}
