use std::fmt;

use crate::buffers::InPlaceSupport;
use crate::error::{Result, RuntimeError};
use crate::executor::{ConfigureContext, ExecutionContext};
use crate::graph::{OpCode, Operator};
use crate::kernels::{self, OpData};

/// One-time validation and precompute for an operator.
pub type ConfigureFn = fn(&mut ConfigureContext<'_>, &Operator) -> Result<OpData>;

/// Per-pass computation for an operator, given its configure output.
pub type ExecuteFn = fn(&mut ExecutionContext<'_>, &Operator, &OpData) -> Result<()>;

/// The configure/execute pair implementing one operator.
#[derive(Clone, Copy)]
pub struct KernelRegistration {
    pub name: &'static str,
    pub configure: ConfigureFn,
    pub execute: ExecuteFn,
    pub in_place: InPlaceSupport,
}

impl fmt::Debug for KernelRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelRegistration")
            .field("name", &self.name)
            .field("in_place", &self.in_place)
            .finish()
    }
}

/// Dispatch table from operator code to kernel, built once per interpreter.
///
/// Alternate backends replace entries with [`KernelRegistry::register`];
/// they must honor the same configure/execute contract.
#[derive(Debug, Clone)]
pub struct KernelRegistry {
    table: [Option<KernelRegistration>; OpCode::COUNT],
}

impl KernelRegistry {
    pub fn empty() -> Self {
        KernelRegistry {
            table: [None; OpCode::COUNT],
        }
    }

    /// A registry holding every built-in kernel.
    pub fn builtin() -> Self {
        let mut registry = KernelRegistry::empty();
        kernels::register_builtins(&mut registry);
        registry
    }

    /// Installs `registration` for `op`, returning the one it replaces.
    pub fn register(
        &mut self,
        op: OpCode,
        registration: KernelRegistration,
    ) -> Option<KernelRegistration> {
        self.table[op.index()].replace(registration)
    }

    pub fn get(&self, op: OpCode) -> Result<&KernelRegistration> {
        self.table[op.index()]
            .as_ref()
            .ok_or(RuntimeError::UnregisteredOp(op))
    }

    pub fn contains(&self, op: OpCode) -> bool {
        self.table[op.index()].is_some()
    }
}

impl Default for KernelRegistry {
    fn default() -> Self {
        KernelRegistry::builtin()
    }
}
