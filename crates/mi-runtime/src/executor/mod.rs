//! Subgraph configure and execute passes.
//!
//! Both passes carry an explicit context naming the active subgraph. Nested
//! subgraphs are entered through [`ConfigureContext::enter`] and
//! [`ExecutionContext::enter`], which restore the previous subgraph on every
//! exit path.

pub mod configure;
pub mod execute;

pub use configure::ConfigureContext;
pub use execute::ExecutionContext;

use crate::error::RuntimeError;
use crate::graph::OpCode;
use crate::kernels::OpData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum PlanStatus {
    #[default]
    Pending,
    InProgress,
    Configured,
}

/// Configure results of one subgraph.
#[derive(Debug, Default)]
pub(crate) struct SubgraphPlan {
    pub status: PlanStatus,
    pub op_data: Vec<OpData>,
    /// `(input, output)` pairs each operator runs in place.
    pub in_place: Vec<Vec<(usize, usize)>>,
}

impl RuntimeError {
    /// Attaches the failing operator's location.
    pub(crate) fn at(self, subgraph: usize, index: usize, op: OpCode) -> RuntimeError {
        RuntimeError::Operator {
            subgraph,
            index,
            op,
            source: Box::new(self),
        }
    }
}
