use crate::error::{Result, RuntimeError};

/// Tunables for an [`Interpreter`](crate::Interpreter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Upper bound on While loop iterations per execute. `None` runs until
    /// the condition subgraph yields false.
    pub max_while_iterations: Option<u32>,
    /// Maximum nesting of subgraphs during configure and execute, counting
    /// the entry subgraph.
    pub max_subgraph_depth: usize,
    /// Alignment of every arena offset in bytes. Power of two, at least 8.
    pub arena_alignment: usize,
    /// Per-subgraph arena size cap in bytes.
    pub arena_limit: Option<usize>,
    /// Per-tensor cap on dynamic reallocation in bytes.
    pub dynamic_limit: Option<usize>,
    /// Allow kernels to write outputs into the buffer of an eligible input.
    pub in_place: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            max_while_iterations: None,
            max_subgraph_depth: 8,
            arena_alignment: 16,
            arena_limit: None,
            dynamic_limit: None,
            in_place: true,
        }
    }
}

impl RuntimeConfig {
    pub fn with_max_while_iterations(mut self, limit: u32) -> Self {
        self.max_while_iterations = Some(limit);
        self
    }

    pub fn with_max_subgraph_depth(mut self, depth: usize) -> Self {
        self.max_subgraph_depth = depth;
        self
    }

    pub fn with_arena_alignment(mut self, alignment: usize) -> Self {
        self.arena_alignment = alignment;
        self
    }

    pub fn with_arena_limit(mut self, bytes: usize) -> Self {
        self.arena_limit = Some(bytes);
        self
    }

    pub fn with_dynamic_limit(mut self, bytes: usize) -> Self {
        self.dynamic_limit = Some(bytes);
        self
    }

    pub fn with_in_place(mut self, enabled: bool) -> Self {
        self.in_place = enabled;
        self
    }

    /// Rejects settings the planner cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.arena_alignment < 8 || !self.arena_alignment.is_power_of_two() {
            return Err(RuntimeError::invariant(format!(
                "arena alignment {} must be a power of two of at least 8",
                self.arena_alignment
            )));
        }
        if self.max_subgraph_depth == 0 {
            return Err(RuntimeError::invariant("max_subgraph_depth must be at least 1"));
        }
        Ok(())
    }
}
