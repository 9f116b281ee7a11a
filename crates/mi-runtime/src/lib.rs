//! `mi-runtime` - Kernel execution engine for the micro-interpreter.
//!
//! This crate provides:
//! - The in-memory graph model a loader hands over (`graph`)
//! - Per-subgraph buffer management with an arena planner and in-place reuse
//! - Typed access helpers that kernels read and write tensors through
//! - The kernel registry and the built-in kernels, control flow included
//! - Configure/execute passes over explicit contexts, and the `Interpreter`
//!   facade tying them together

pub mod access;
pub mod buffers;
pub mod config;
pub mod error;
pub mod executor;
pub mod graph;
pub mod interpreter;
pub mod kernels;
pub mod registry;

// Re-export primary types at the crate root for convenience.
pub use buffers::{BufferManager, BufferState, InPlaceSupport, TensorRole};
pub use config::RuntimeConfig;
pub use error::{ErrorKind, Result, RuntimeError};
pub use executor::{ConfigureContext, ExecutionContext};
pub use graph::{
    Conv2DOptions, Graph, OpCode, OpOptions, Operator, Padding, Subgraph, SubgraphBuilder,
    TensorSpec,
};
pub use interpreter::Interpreter;
pub use kernels::OpData;
pub use registry::{ConfigureFn, ExecuteFn, KernelRegistration, KernelRegistry};
