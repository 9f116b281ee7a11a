use log::{trace, warn};
use mi_tensor::{DType, Shape, TensorDescriptor};

use crate::buffers::{BufferManager, IoViews};
use crate::config::RuntimeConfig;
use crate::error::{Result, RuntimeError};
use crate::executor::{PlanStatus, SubgraphPlan};
use crate::graph::{Graph, Operator, Subgraph};
use crate::kernels::OpData;
use crate::registry::KernelRegistry;

/// State threaded through an execute pass.
///
/// Kernels address tensors of the active subgraph by index. Control-flow
/// kernels use the cross-subgraph helpers to wire parent tensors into nested
/// subgraphs and run them.
pub struct ExecutionContext<'a> {
    graph: &'a Graph,
    registry: &'a KernelRegistry,
    config: &'a RuntimeConfig,
    plans: &'a [SubgraphPlan],
    buffers: &'a mut [BufferManager],
    active: usize,
    depth: usize,
}

impl<'a> ExecutionContext<'a> {
    pub(crate) fn new(
        graph: &'a Graph,
        registry: &'a KernelRegistry,
        config: &'a RuntimeConfig,
        plans: &'a [SubgraphPlan],
        buffers: &'a mut [BufferManager],
    ) -> Self {
        ExecutionContext {
            graph,
            registry,
            config,
            plans,
            buffers,
            active: 0,
            depth: 0,
        }
    }

    pub fn active(&self) -> usize {
        self.active
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn config(&self) -> &RuntimeConfig {
        self.config
    }

    pub fn graph(&self) -> &'a Graph {
        self.graph
    }

    pub fn descriptor(&self, t: usize) -> Result<&'a TensorDescriptor> {
        let graph = self.graph;
        Ok(&graph.subgraph(self.active)?.tensor(t)?.descriptor)
    }

    pub fn buffers_of(&self, subgraph: usize) -> Result<&BufferManager> {
        self.buffers
            .get(subgraph)
            .ok_or_else(|| RuntimeError::invariant(format!("subgraph index {subgraph} out of range")))
    }

    fn buffers_mut(&mut self, subgraph: usize) -> Result<&mut BufferManager> {
        self.buffers
            .get_mut(subgraph)
            .ok_or_else(|| RuntimeError::invariant(format!("subgraph index {subgraph} out of range")))
    }

    pub fn shape(&self, t: usize) -> Result<&Shape> {
        self.buffers_of(self.active)?.shape(t)
    }

    pub fn dtype(&self, t: usize) -> Result<DType> {
        self.buffers_of(self.active)?.dtype(t)
    }

    pub fn is_dynamic(&self, t: usize) -> bool {
        self.buffers_of(self.active).is_ok_and(|b| b.is_dynamic(t))
    }

    /// Bytes of `t` in the active subgraph.
    pub fn read(&self, t: usize) -> Result<&[u8]> {
        self.buffers_of(self.active)?.read(t)
    }

    pub fn resize_dynamic(&mut self, t: usize, shape: Shape) -> Result<()> {
        let active = self.active;
        self.buffers_mut(active)?.resize_dynamic(t, shape)
    }

    /// Read views of `inputs` and the write view of `output` in the active
    /// subgraph.
    pub fn io(&mut self, inputs: &[Option<usize>], output: usize) -> Result<IoViews<'_>> {
        let active = self.active;
        self.buffers_mut(active)?.io(inputs, output)
    }

    /// Copies `src` into `dst` within the active subgraph. A no-op when `src`
    /// was handed to `dst` in place.
    pub fn copy_tensor(&mut self, src: usize, dst: usize) -> Result<()> {
        let active = self.active;
        let buffers = self.buffers_mut(active)?;
        {
            let mut views = buffers.io(&[Some(src)], dst)?;
            let input = views.inputs[0].ok_or(RuntimeError::MissingBuffer { tensor: src })?;
            if input.dtype != views.output.dtype {
                return Err(RuntimeError::TypeMismatch {
                    tensor: dst,
                    expected: views.output.dtype,
                    got: input.dtype,
                });
            }
            if input.shape != views.output.shape {
                return Err(RuntimeError::ShapeMismatch {
                    tensor: dst,
                    expected: views.output.shape.dims().to_vec(),
                    got: input.shape.dims().to_vec(),
                });
            }
            if let crate::access::Operand::Slice(bytes) = input.bytes {
                views.output.bytes.copy_from_slice(bytes);
            }
        }
        buffers.mark_valid(dst)
    }

    fn pair_mut(&mut self, a: usize, b: usize) -> Result<(&mut BufferManager, &mut BufferManager)> {
        let n = self.buffers.len();
        if a == b || a >= n || b >= n {
            return Err(RuntimeError::invariant(format!(
                "cannot pair subgraphs {a} and {b}"
            )));
        }
        if a < b {
            let (left, right) = self.buffers.split_at_mut(b);
            Ok((&mut left[a], &mut right[0]))
        } else {
            let (left, right) = self.buffers.split_at_mut(a);
            Ok((&mut right[0], &mut left[b]))
        }
    }

    /// Binds tensor `parent` of the active subgraph to declared input `slot`
    /// of `child`. Constant and caller-bound buffers are shared without
    /// copying; everything else is copied.
    pub fn configure_input(&mut self, child: usize, slot: usize, parent: usize) -> Result<()> {
        let graph = self.graph;
        let child_tensor = input_of(graph.subgraph(child)?, slot)?;
        let active = self.active;
        let (src, dst) = self.pair_mut(active, child)?;
        let expected = dst.shape(child_tensor)?;
        let got = src.shape(parent)?;
        if expected != got {
            return Err(RuntimeError::ShapeMismatch {
                tensor: parent,
                expected: expected.dims().to_vec(),
                got: got.dims().to_vec(),
            });
        }
        match src.shared_handle(parent) {
            Some(shared) => dst.bind_external(child_tensor, shared),
            None => dst.write_bytes(child_tensor, src.read(parent)?),
        }
    }

    /// Copies declared output `slot` of `child` into tensor `parent` of the
    /// active subgraph, reallocating `parent` first if it is dynamic.
    pub fn copy_output(&mut self, child: usize, slot: usize, parent: usize) -> Result<()> {
        let graph = self.graph;
        let child_tensor = output_of(graph.subgraph(child)?, slot)?;
        let active = self.active;
        let (dst, src) = self.pair_mut(active, child)?;
        let shape = src.shape(child_tensor)?.clone();
        if dst.is_dynamic(parent) {
            dst.resize_dynamic(parent, shape)?;
        } else if dst.shape(parent)? != &shape {
            return Err(RuntimeError::ShapeMismatch {
                tensor: parent,
                expected: dst.shape(parent)?.dims().to_vec(),
                got: shape.dims().to_vec(),
            });
        }
        dst.write_bytes(parent, src.read(child_tensor)?)
    }

    /// The first byte of declared output `slot` of `child`, read as a bool.
    pub fn read_bool_output(&self, child: usize, slot: usize) -> Result<bool> {
        let graph = self.graph;
        let t = output_of(graph.subgraph(child)?, slot)?;
        let bytes = self.buffers_of(child)?.read(t)?;
        bytes
            .first()
            .map(|&b| b != 0)
            .ok_or(RuntimeError::MissingBuffer { tensor: t })
    }

    /// Releases per-pass state of a nested subgraph after use.
    pub fn reset_subgraph(&mut self, subgraph: usize) -> Result<()> {
        self.buffers_mut(subgraph)?.reset_transient();
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

    /// Executes every operator of `subgraph` in order, stopping at the first
    /// failure.
    pub fn execute_subgraph(&mut self, subgraph: usize) -> Result<()> {
        let graph = self.graph;
        let plans = self.plans;
        let sg = graph.subgraph(subgraph)?;
        let plan = plans
            .get(subgraph)
            .filter(|p| p.status == PlanStatus::Configured)
            .ok_or_else(|| RuntimeError::invariant(format!("subgraph {subgraph} is not configured")))?;
        self.enter(subgraph, |ctx| {
            ctx.buffers_mut(subgraph)?.begin_pass();
            for (index, op) in sg.operators.iter().enumerate() {
                let data = plan.op_data.get(index).ok_or_else(|| {
                    RuntimeError::invariant(format!("operator {index} has no configure data"))
                })?;
                let pairs = plan.in_place.get(index).map(Vec::as_slice).unwrap_or(&[]);
                ctx.run_operator(index, op, data, pairs)
                    .map_err(|e| e.at(subgraph, index, op.opcode))?;
            }
            Ok(())
        })
    }

    fn run_operator(
        &mut self,
        index: usize,
        op: &Operator,
        data: &OpData,
        pairs: &[(usize, usize)],
    ) -> Result<()> {
        let registry = self.registry;
        let registration = registry.get(op.opcode)?;
        let active = self.active;
        trace!("subgraph {active}: executing operator {index} ({})", op.opcode);
        for &(input, output) in pairs {
            if let Err(e) = self.buffers_mut(active)?.transfer_in_place(input, output) {
                warn!("subgraph {active}: in-place reuse of tensor {input} by tensor {output} rejected: {e}");
                return Err(e);
            }
        }
        (registration.execute)(self, op, data)?;
        let buffers = self.buffers_mut(active)?;
        for &t in &op.outputs {
            buffers.mark_valid(t)?;
        }
        Ok(())
    }
}

fn input_of(subgraph: &Subgraph, slot: usize) -> Result<usize> {
    subgraph
        .inputs
        .get(slot)
        .copied()
        .ok_or_else(|| RuntimeError::invariant(format!("subgraph has no input {slot}")))
}

fn output_of(subgraph: &Subgraph, slot: usize) -> Result<usize> {
    subgraph
        .outputs
        .get(slot)
        .copied()
        .ok_or_else(|| RuntimeError::invariant(format!("subgraph has no output {slot}")))
}
