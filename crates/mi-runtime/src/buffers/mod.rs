//! Runtime buffer management: arena planning, per-tensor ownership states,
//! in-place aliasing and dynamic reallocation.
//!
//! [`BufferManager`] is the only code that moves a tensor between
//! [`BufferState`]s. Kernels see bytes only through the views it hands out
//! for the duration of one execute call.

pub mod arena;
pub mod manager;
pub mod planner;
pub mod policy;

pub use arena::ArenaView;
pub use manager::{BufferManager, IoViews, MAX_KERNEL_INPUTS};
pub use planner::{plan_greedy, ArenaPlan, BufferRequest};
pub use policy::InPlaceSupport;

use std::ops::Range;

use mi_tensor::{AlignedBuf, SharedBuffer};

/// Who owns the bytes behind a tensor at this moment.
#[derive(Debug, Clone, PartialEq)]
pub enum BufferState {
    /// No storage is bound.
    Unbound,
    /// Read-only data owned by the graph.
    Constant(SharedBuffer),
    /// A byte range of the subgraph's arena.
    Arena(Range<usize>),
    /// A read-only buffer bound by the caller or a parent subgraph.
    External(SharedBuffer),
    /// Storage owned by the tensor, sized at execute time.
    Dynamic(AlignedBuf),
    /// The buffer was handed to `owner` by an in-place operator.
    Released { owner: usize },
}

/// How a tensor is stored across passes, fixed at configure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorRole {
    Constant,
    /// Declared subgraph input without constant data.
    Input,
    /// Produced during the pass and planned into the arena.
    Intermediate,
    /// Shape known only at execute; owns a heap buffer.
    Dynamic,
    /// Not referenced by any operator or declaration.
    Unused,
}
