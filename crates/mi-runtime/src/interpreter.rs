use log::info;
use mi_tensor::{AlignedBuf, Shape, SharedBuffer, Tensor, TensorDescriptor};

use crate::buffers::BufferManager;
use crate::config::RuntimeConfig;
use crate::error::{ErrorKind, Result, RuntimeError};
use crate::executor::{ConfigureContext, ExecutionContext, PlanStatus, SubgraphPlan};
use crate::graph::Graph;
use crate::registry::KernelRegistry;

/// Runs a loaded graph: configure once, then bind inputs, execute and read
/// outputs any number of times.
///
/// ```
/// use mi_runtime::{Graph, Interpreter, OpCode, Operator, RuntimeConfig, SubgraphBuilder};
/// use mi_tensor::{DType, Tensor, TensorDescriptor};
///
/// let mut b = SubgraphBuilder::new();
/// let x = b.input(TensorDescriptor::new(DType::F32, [2]));
/// let y = b.tensor(TensorDescriptor::new(DType::F32, [2]));
/// b.op(Operator::new(OpCode::Neg, &[x], &[y])).output(y);
///
/// let mut interp = Interpreter::new(Graph::new(vec![b.build()]), RuntimeConfig::default()).unwrap();
/// interp.configure(0).unwrap();
/// interp.copy_input(0, 0, bytemuck::cast_slice(&[1.0f32, -2.0])).unwrap();
/// interp.execute(0).unwrap();
/// let out = interp.output_tensor(0, 0).unwrap();
/// assert_eq!(out.as_slice::<f32>().unwrap(), &[-1.0, 2.0]);
/// ```
#[derive(Debug)]
pub struct Interpreter {
    graph: Graph,
    registry: KernelRegistry,
    config: RuntimeConfig,
    plans: Vec<SubgraphPlan>,
    buffers: Vec<BufferManager>,
    poisoned: bool,
}

impl Interpreter {
    /// An interpreter over `graph` with the built-in kernels.
    pub fn new(graph: Graph, config: RuntimeConfig) -> Result<Self> {
        Interpreter::with_registry(graph, config, KernelRegistry::builtin())
    }

    pub fn with_registry(graph: Graph, config: RuntimeConfig, registry: KernelRegistry) -> Result<Self> {
        config.validate()?;
        if graph.is_empty() {
            return Err(RuntimeError::invariant("graph has no subgraphs"));
        }
        let (plans, buffers) = fresh_state(&graph);
        Ok(Interpreter {
            graph,
            registry,
            config,
            plans,
            buffers,
            poisoned: false,
        })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn registry(&self) -> &KernelRegistry {
        &self.registry
    }

    /// Validates and plans `subgraph` and every subgraph it reaches,
    /// discarding any earlier configuration and bound inputs.
    ///
    /// # Errors
    ///
    /// The first operator configure failure, wrapped with its location. The
    /// interpreter is left unconfigured.
    pub fn configure(&mut self, subgraph: usize) -> Result<()> {
        self.graph.subgraph(subgraph)?;
        let (plans, buffers) = fresh_state(&self.graph);
        self.plans = plans;
        self.buffers = buffers;
        self.poisoned = false;
        let result = ConfigureContext::new(
            &self.graph,
            &self.registry,
            &self.config,
            &mut self.plans,
            &mut self.buffers,
            false,
        )
        .configure_subgraph(subgraph);
        if let Err(e) = result {
            let (plans, buffers) = fresh_state(&self.graph);
            self.plans = plans;
            self.buffers = buffers;
            return Err(e);
        }
        let configured = self
            .plans
            .iter()
            .filter(|p| p.status == PlanStatus::Configured)
            .count();
        let arena: usize = self.buffers.iter().map(BufferManager::arena_size).sum();
        info!("configured subgraph {subgraph}: {configured} subgraphs, {arena} arena bytes");
        Ok(())
    }

    /// Runs every configure check for `subgraph` without allocating arenas.
    /// The interpreter's own configuration is not touched.
    pub fn validate(&self, subgraph: usize) -> Result<()> {
        self.graph.subgraph(subgraph)?;
        let (mut plans, mut buffers) = fresh_state(&self.graph);
        ConfigureContext::new(
            &self.graph,
            &self.registry,
            &self.config,
            &mut plans,
            &mut buffers,
            true,
        )
        .configure_subgraph(subgraph)
    }

    pub fn is_configured(&self, subgraph: usize) -> bool {
        self.plans
            .get(subgraph)
            .is_some_and(|p| p.status == PlanStatus::Configured)
    }

    /// True after an execute failed with an invariant violation; cleared
    /// by [`Interpreter::configure`].
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    fn ready(&self, subgraph: usize) -> Result<()> {
        if self.poisoned {
            return Err(RuntimeError::Poisoned);
        }
        if !self.is_configured(subgraph) {
            return Err(RuntimeError::invariant(format!(
                "subgraph {subgraph} is not configured"
            )));
        }
        Ok(())
    }

    pub fn input_index(&self, subgraph: usize, slot: usize) -> Result<usize> {
        self.graph
            .subgraph(subgraph)?
            .inputs
            .get(slot)
            .copied()
            .ok_or_else(|| RuntimeError::invariant(format!("subgraph {subgraph} has no input {slot}")))
    }

    pub fn output_index(&self, subgraph: usize, slot: usize) -> Result<usize> {
        self.graph
            .subgraph(subgraph)?
            .outputs
            .get(slot)
            .copied()
            .ok_or_else(|| RuntimeError::invariant(format!("subgraph {subgraph} has no output {slot}")))
    }

    /// Binds `buffer` to declared input `slot` without copying. The binding
    /// persists across executes until replaced or the interpreter is
    /// reconfigured.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` when the buffer length differs from the input's byte
    /// size.
    pub fn set_input(&mut self, subgraph: usize, slot: usize, buffer: SharedBuffer) -> Result<()> {
        self.ready(subgraph)?;
        let t = self.input_index(subgraph, slot)?;
        self.buffers[subgraph].bind_external(t, buffer)
    }

    /// Copies `bytes` into the arena storage of declared input `slot`.
    pub fn copy_input(&mut self, subgraph: usize, slot: usize, bytes: &[u8]) -> Result<()> {
        self.ready(subgraph)?;
        let t = self.input_index(subgraph, slot)?;
        self.buffers[subgraph].write_bytes(t, bytes)
    }

    /// Runs one pass over `subgraph`, stopping at the first failing operator.
    ///
    /// An `InvariantViolation` poisons the interpreter until the next
    /// [`Interpreter::configure`]; other failures leave it reusable.
    pub fn execute(&mut self, subgraph: usize) -> Result<()> {
        self.ready(subgraph)?;
        let result = ExecutionContext::new(
            &self.graph,
            &self.registry,
            &self.config,
            &self.plans,
            &mut self.buffers,
        )
        .execute_subgraph(subgraph);
        if let Err(e) = &result {
            if e.kind() == ErrorKind::InvariantViolation {
                self.poisoned = true;
            }
        }
        result
    }

    /// Bytes of declared output `slot`, or `None` if it holds no data this
    /// pass.
    pub fn get_output(&self, subgraph: usize, slot: usize) -> Option<&[u8]> {
        let t = self.output_index(subgraph, slot).ok()?;
        self.buffers.get(subgraph)?.read(t).ok()
    }

    /// Current shape of declared output `slot`. Dynamic outputs report the
    /// shape of the last pass.
    pub fn output_shape(&self, subgraph: usize, slot: usize) -> Option<&Shape> {
        let t = self.output_index(subgraph, slot).ok()?;
        self.buffers.get(subgraph)?.shape(t).ok()
    }

    /// An owned copy of declared output `slot`.
    ///
    /// # Errors
    ///
    /// `MissingBuffer` if the output holds no data this pass.
    pub fn output_tensor(&self, subgraph: usize, slot: usize) -> Result<Tensor> {
        let t = self.output_index(subgraph, slot)?;
        let buffers = self
            .buffers
            .get(subgraph)
            .ok_or_else(|| RuntimeError::invariant(format!("subgraph index {subgraph} out of range")))?;
        let spec = self.graph.subgraph(subgraph)?.tensor(t)?;
        let descriptor = TensorDescriptor {
            shape: buffers.shape(t)?.clone(),
            ..spec.descriptor.clone()
        };
        let data = AlignedBuf::from_bytes(buffers.read(t)?)?;
        Ok(Tensor::from_parts(descriptor, data)?)
    }

    /// Buffer state of `subgraph`, for inspection.
    pub fn buffer_manager(&self, subgraph: usize) -> Option<&BufferManager> {
        self.buffers.get(subgraph)
    }
}

fn fresh_state(graph: &Graph) -> (Vec<SubgraphPlan>, Vec<BufferManager>) {
    let plans = graph.subgraphs.iter().map(|_| SubgraphPlan::default()).collect();
    let buffers = graph
        .subgraphs
        .iter()
        .enumerate()
        .map(|(i, sg)| BufferManager::new(i, sg))
        .collect();
    (plans, buffers)
}
