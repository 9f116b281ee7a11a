use log::debug;
use mi_tensor::{DType, Shape, TensorDescriptor, TensorError};

use crate::buffers::planner::plan_subgraph;
use crate::buffers::{policy, BufferManager};
use crate::config::RuntimeConfig;
use crate::error::{Result, RuntimeError};
use crate::executor::{PlanStatus, SubgraphPlan};
use crate::graph::{Graph, Subgraph};
use crate::registry::KernelRegistry;

/// State threaded through a configure pass.
///
/// Kernel `configure` functions read descriptors and resolved shapes of the
/// active subgraph through it, mark tensors dynamic, and configure nested
/// subgraphs.
pub struct ConfigureContext<'a> {
    graph: &'a Graph,
    registry: &'a KernelRegistry,
    config: &'a RuntimeConfig,
    plans: &'a mut [SubgraphPlan],
    buffers: &'a mut [BufferManager],
    validate_only: bool,
    active: usize,
    depth: usize,
}

impl<'a> ConfigureContext<'a> {
    pub(crate) fn new(
        graph: &'a Graph,
        registry: &'a KernelRegistry,
        config: &'a RuntimeConfig,
        plans: &'a mut [SubgraphPlan],
        buffers: &'a mut [BufferManager],
        validate_only: bool,
    ) -> Self {
        ConfigureContext {
            graph,
            registry,
            config,
            plans,
            buffers,
            validate_only,
            active: 0,
            depth: 0,
        }
    }

    /// Index of the subgraph whose operators are being configured.
    pub fn active(&self) -> usize {
        self.active
    }

    pub fn config(&self) -> &RuntimeConfig {
        self.config
    }

    pub fn graph(&self) -> &'a Graph {
        self.graph
    }

    pub fn subgraph(&self) -> Result<&'a Subgraph> {
        let graph = self.graph;
        graph.subgraph(self.active)
    }

    pub fn descriptor(&self, t: usize) -> Result<&'a TensorDescriptor> {
        Ok(&self.subgraph()?.tensor(t)?.descriptor)
    }

    /// Constant bytes of `t`, if the graph supplies them.
    pub fn constant_data(&self, t: usize) -> Option<&'a [u8]> {
        let subgraph = self.subgraph().ok()?;
        subgraph.tensors.get(t)?.data.as_deref().map(|b| b.as_bytes())
    }

    pub fn is_constant(&self, t: usize) -> bool {
        self.constant_data(t).is_some()
    }

    fn active_buffers(&self) -> Result<&BufferManager> {
        self.buffers_of(self.active)
    }

    /// Buffer manager of any subgraph, for inspecting nested subgraph I/O.
    pub fn buffers_of(&self, subgraph: usize) -> Result<&BufferManager> {
        self.buffers
            .get(subgraph)
            .ok_or_else(|| RuntimeError::invariant(format!("subgraph index {subgraph} out of range")))
    }

    pub fn shape(&self, t: usize) -> Result<&Shape> {
        self.active_buffers()?.shape(t)
    }

    pub fn dtype(&self, t: usize) -> Result<DType> {
        self.active_buffers()?.dtype(t)
    }

    pub fn is_dynamic(&self, t: usize) -> bool {
        self.active_buffers().is_ok_and(|b| b.is_dynamic(t))
    }

    /// Defers allocation of `t` to execute, where its shape becomes known.
    pub fn mark_dynamic(&mut self, t: usize) -> Result<()> {
        debug!("subgraph {}: tensor {t} is dynamic", self.active);
        let active = self.active;
        self.buffers
            .get_mut(active)
            .ok_or_else(|| RuntimeError::invariant(format!("subgraph index {active} out of range")))?
            .mark_dynamic(t)
    }

    /// Fails with `TypeMismatch` unless `t` has element type `dtype`.
    pub fn expect_dtype(&self, t: usize, dtype: DType) -> Result<()> {
        let got = self.dtype(t)?;
        if got != dtype {
            return Err(RuntimeError::TypeMismatch {
                tensor: t,
                expected: dtype,
                got,
            });
        }
        Ok(())
    }

    /// Fails with `ShapeMismatch` unless the static tensor `t` has `shape`.
    pub fn expect_shape(&self, t: usize, shape: &Shape) -> Result<()> {
        let got = self.shape(t)?;
        if got != shape {
            return Err(RuntimeError::ShapeMismatch {
                tensor: t,
                expected: shape.dims().to_vec(),
                got: got.dims().to_vec(),
            });
        }
        Ok(())
    }

    /// Runs `f` with `subgraph` active, restoring the previous subgraph
    /// afterwards whether or not `f` succeeds.
    pub fn enter<R>(&mut self, subgraph: usize, f: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        if self.depth >= self.config.max_subgraph_depth {
            return Err(RuntimeError::invariant(format!(
                "subgraph nesting exceeds the limit of {}",
                self.config.max_subgraph_depth
            )));
        }
        let saved = self.active;
        self.active = subgraph;
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        self.active = saved;
        result
    }

    /// Configures `subgraph` and every subgraph it references. A subgraph
    /// already configured in this pass is skipped.
    ///
    /// # Errors
    ///
    /// `InvariantViolation` when a subgraph is reachable from itself or
    /// nesting exceeds `max_subgraph_depth`; otherwise the first operator
    /// configure failure.
    pub fn configure_subgraph(&mut self, subgraph: usize) -> Result<()> {
        let graph = self.graph;
        let sg = graph.subgraph(subgraph)?;
        let status = self
            .plans
            .get(subgraph)
            .map(|p| p.status)
            .ok_or_else(|| RuntimeError::invariant(format!("no plan for subgraph {subgraph}")))?;
        match status {
            PlanStatus::Configured => return Ok(()),
            PlanStatus::InProgress => {
                return Err(RuntimeError::invariant(format!(
                    "subgraph {subgraph} is reachable from itself"
                )))
            }
            PlanStatus::Pending => {}
        }
        self.plans[subgraph].status = PlanStatus::InProgress;
        let result = self.enter(subgraph, |ctx| ctx.configure_active(sg));
        self.plans[subgraph].status = match result {
            Ok(()) => PlanStatus::Configured,
            Err(_) => PlanStatus::Pending,
        };
        result
    }

    fn configure_active(&mut self, subgraph: &'a Subgraph) -> Result<()> {
        let index = self.active;
        subgraph.check_indices()?;
        for spec in &subgraph.tensors {
            spec.descriptor.validate()?;
            if let Some(data) = &spec.data {
                if data.len() != spec.descriptor.byte_size() {
                    return Err(TensorError::BufferLength {
                        expected: spec.descriptor.byte_size(),
                        got: data.len(),
                    }
                    .into());
                }
            }
        }

        let registry = self.registry;
        let mut op_data = Vec::with_capacity(subgraph.operators.len());
        for (i, op) in subgraph.operators.iter().enumerate() {
            debug!("subgraph {index}: configuring operator {i} ({})", op.opcode);
            let data = registry
                .get(op.opcode)
                .and_then(|registration| (registration.configure)(self, op))
                .map_err(|e| e.at(index, i, op.opcode))?;
            op_data.push(data);
        }

        let buffers = self.buffers_of(index)?;
        let in_place: Vec<Vec<(usize, usize)>> = subgraph
            .operators
            .iter()
            .map(|op| {
                if !self.config.in_place {
                    return Vec::new();
                }
                let support = registry.get(op.opcode).map(|r| r.in_place).unwrap_or_default();
                policy::decide(support, subgraph, buffers, op)
            })
            .collect();
        for (i, pairs) in in_place.iter().enumerate() {
            for (input, output) in pairs {
                debug!("subgraph {index}: operator {i} writes tensor {output} in place of tensor {input}");
            }
        }

        if !self.validate_only {
            let layout = plan_subgraph(subgraph, buffers, &in_place, self.config.arena_alignment)?;
            let buffers = &mut self.buffers[index];
            buffers.set_dynamic_limit(self.config.dynamic_limit);
            buffers.install_plan(&layout, self.config.arena_limit)?;
        }

        let plan = &mut self.plans[index];
        plan.op_data = op_data;
        plan.in_place = in_place;
        Ok(())
    }
}
