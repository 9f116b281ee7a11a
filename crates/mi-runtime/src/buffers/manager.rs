use std::ops::Range;

use log::debug;
use mi_tensor::{AlignedBuf, DType, Shape, SharedBuffer, TensorError};

use crate::access::view::{InputView, Operand, OutputView};
use crate::buffers::arena::ArenaView;
use crate::buffers::planner::ArenaLayout;
use crate::buffers::{BufferState, TensorRole};
use crate::error::{Result, RuntimeError};
use crate::graph::Subgraph;

/// Inputs a single kernel call can resolve at once.
pub const MAX_KERNEL_INPUTS: usize = 4;

#[derive(Debug)]
struct TensorSlot {
    dtype: DType,
    shape: Shape,
    role: TensorRole,
    /// State restored at the start of every pass.
    planned: BufferState,
    state: BufferState,
    /// Set once the current pass has written (or bound) the data.
    valid: bool,
}

impl TensorSlot {
    fn byte_size(&self) -> usize {
        self.shape.numel() * self.dtype.size_in_bytes()
    }
}

/// Buffers of one subgraph: its arena plus the ownership state of every
/// tensor in its table.
#[derive(Debug)]
pub struct BufferManager {
    subgraph: usize,
    arena: AlignedBuf,
    slots: Vec<TensorSlot>,
    dynamic_limit: Option<usize>,
}

/// Views resolved for one kernel call.
#[derive(Debug)]
pub struct IoViews<'a> {
    pub inputs: [Option<InputView<'a>>; MAX_KERNEL_INPUTS],
    pub output: OutputView<'a>,
}

impl BufferManager {
    /// Creates the manager with roles derived from the subgraph structure.
    /// Nothing but constants is bound until a plan is installed.
    pub fn new(index: usize, subgraph: &Subgraph) -> Self {
        let mut referenced = vec![false; subgraph.tensors.len()];
        for op in &subgraph.operators {
            for &t in op.inputs.iter().flatten().chain(op.outputs.iter()) {
                if let Some(r) = referenced.get_mut(t) {
                    *r = true;
                }
            }
        }
        for &t in subgraph.outputs.iter() {
            if let Some(r) = referenced.get_mut(t) {
                *r = true;
            }
        }

        let slots = subgraph
            .tensors
            .iter()
            .enumerate()
            .map(|(t, spec)| {
                let (role, planned) = match &spec.data {
                    Some(data) => (TensorRole::Constant, BufferState::Constant(data.clone())),
                    None if subgraph.inputs.contains(&t) => (TensorRole::Input, BufferState::Unbound),
                    None if referenced[t] => (TensorRole::Intermediate, BufferState::Unbound),
                    None => (TensorRole::Unused, BufferState::Unbound),
                };
                TensorSlot {
                    dtype: spec.descriptor.dtype,
                    shape: spec.descriptor.shape.clone(),
                    role,
                    valid: role == TensorRole::Constant,
                    state: planned.clone(),
                    planned,
                }
            })
            .collect();

        BufferManager {
            subgraph: index,
            arena: AlignedBuf::default(),
            slots,
            dynamic_limit: None,
        }
    }

    fn slot(&self, t: usize) -> Result<&TensorSlot> {
        self.slots.get(t).ok_or_else(|| {
            RuntimeError::invariant(format!(
                "tensor {t} out of range in subgraph {}",
                self.subgraph
            ))
        })
    }

    fn slot_mut(&mut self, t: usize) -> Result<&mut TensorSlot> {
        let subgraph = self.subgraph;
        self.slots.get_mut(t).ok_or_else(|| {
            RuntimeError::invariant(format!("tensor {t} out of range in subgraph {subgraph}"))
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Current shape. Dynamic tensors report the shape of their last
    /// allocation.
    pub fn shape(&self, t: usize) -> Result<&Shape> {
        Ok(&self.slot(t)?.shape)
    }

    pub fn dtype(&self, t: usize) -> Result<DType> {
        Ok(self.slot(t)?.dtype)
    }

    pub fn role(&self, t: usize) -> Result<TensorRole> {
        Ok(self.slot(t)?.role)
    }

    pub fn byte_size(&self, t: usize) -> Result<usize> {
        Ok(self.slot(t)?.byte_size())
    }

    pub fn is_dynamic(&self, t: usize) -> bool {
        matches!(self.role(t), Ok(TensorRole::Dynamic))
    }

    pub fn is_valid(&self, t: usize) -> bool {
        self.slots.get(t).is_some_and(|s| s.valid)
    }

    pub fn state(&self, t: usize) -> Option<&BufferState> {
        self.slots.get(t).map(|s| &s.state)
    }

    pub fn arena_size(&self) -> usize {
        self.arena.len()
    }

    pub(crate) fn set_dynamic_limit(&mut self, limit: Option<usize>) {
        self.dynamic_limit = limit;
    }

    /// Marks an intermediate tensor as dynamically shaped. Idempotent.
    pub(crate) fn mark_dynamic(&mut self, t: usize) -> Result<()> {
        let slot = self.slot_mut(t)?;
        match slot.role {
            TensorRole::Dynamic => Ok(()),
            TensorRole::Intermediate => {
                slot.role = TensorRole::Dynamic;
                slot.planned = BufferState::Unbound;
                slot.state = BufferState::Unbound;
                Ok(())
            }
            role => Err(RuntimeError::invariant(format!(
                "tensor {t} with role {role:?} cannot be dynamic"
            ))),
        }
    }

    /// Allocates the arena and binds every planned tensor to its range.
    pub(crate) fn install_plan(&mut self, layout: &ArenaLayout, limit: Option<usize>) -> Result<()> {
        if let Some(limit) = limit {
            if layout.size > limit {
                return Err(RuntimeError::ArenaLimitExceeded {
                    required: layout.size,
                    limit,
                });
            }
        }
        self.arena = AlignedBuf::zeroed(layout.size).map_err(|_| RuntimeError::AllocationFailure {
            bytes: layout.size,
        })?;
        for (slot, range) in self.slots.iter_mut().zip(layout.ranges.iter()) {
            if let Some(range) = range {
                slot.planned = BufferState::Arena(range.clone());
                slot.state = slot.planned.clone();
                slot.valid = false;
            }
        }
        debug!(
            "subgraph {}: arena of {} bytes for {} tensors",
            self.subgraph,
            layout.size,
            layout.ranges.iter().flatten().count()
        );
        Ok(())
    }

    /// Restores planned bindings before a pass. Caller-bound inputs are kept.
    pub(crate) fn begin_pass(&mut self) {
        for slot in &mut self.slots {
            match slot.role {
                TensorRole::Intermediate => {
                    slot.state = slot.planned.clone();
                    slot.valid = false;
                }
                TensorRole::Dynamic => {
                    if matches!(slot.state, BufferState::Released { .. }) {
                        slot.state = BufferState::Unbound;
                    }
                    slot.valid = false;
                }
                TensorRole::Constant | TensorRole::Input | TensorRole::Unused => {}
            }
        }
    }

    /// Tears down per-pass state of a nested subgraph: unbinds inputs,
    /// invalidates intermediates and frees dynamic buffers. The arena layout
    /// is kept.
    pub(crate) fn reset_transient(&mut self) {
        for slot in &mut self.slots {
            match slot.role {
                TensorRole::Input | TensorRole::Intermediate => {
                    slot.state = slot.planned.clone();
                    slot.valid = false;
                }
                TensorRole::Dynamic => {
                    slot.state = BufferState::Unbound;
                    slot.valid = false;
                }
                TensorRole::Constant | TensorRole::Unused => {}
            }
        }
    }

    /// Binds a read-only buffer to a declared input without copying.
    pub(crate) fn bind_external(&mut self, t: usize, buffer: SharedBuffer) -> Result<()> {
        let slot = self.slot_mut(t)?;
        if slot.role != TensorRole::Input {
            return Err(RuntimeError::invariant(format!(
                "tensor {t} is not a subgraph input"
            )));
        }
        if buffer.len() != slot.byte_size() {
            return Err(TensorError::BufferLength {
                expected: slot.byte_size(),
                got: buffer.len(),
            }
            .into());
        }
        slot.state = BufferState::External(buffer);
        slot.valid = true;
        Ok(())
    }

    /// Copies `bytes` into the tensor's own storage and marks it valid.
    pub(crate) fn write_bytes(&mut self, t: usize, bytes: &[u8]) -> Result<()> {
        let expected = self.byte_size(t)?;
        if bytes.len() != expected {
            return Err(TensorError::BufferLength {
                expected,
                got: bytes.len(),
            }
            .into());
        }
        let subgraph = self.subgraph;
        let slot = self.slots.get_mut(t).ok_or_else(|| {
            RuntimeError::invariant(format!("tensor {t} out of range in subgraph {subgraph}"))
        })?;
        if matches!(slot.state, BufferState::External(_)) {
            slot.state = slot.planned.clone();
        }
        let target = match &mut slot.state {
            BufferState::Arena(range) => self
                .arena
                .as_bytes_mut()
                .get_mut(range.clone())
                .ok_or_else(|| RuntimeError::invariant(format!("range of tensor {t} outside arena")))?,
            BufferState::Dynamic(buf) => buf.as_bytes_mut(),
            other => {
                return Err(RuntimeError::invariant(format!(
                    "tensor {t} in state {} cannot be written",
                    state_name(other)
                )))
            }
        };
        target.copy_from_slice(bytes);
        slot.valid = true;
        Ok(())
    }

    /// The shared handle behind a valid constant or external binding, for
    /// zero-copy forwarding into a nested subgraph.
    pub(crate) fn shared_handle(&self, t: usize) -> Option<SharedBuffer> {
        let slot = self.slots.get(t)?;
        match &slot.state {
            BufferState::Constant(b) | BufferState::External(b) if slot.valid => Some(b.clone()),
            _ => None,
        }
    }

    /// Bytes of a tensor with data valid in this pass. A released tensor
    /// resolves to the buffer of the tensor it was handed to.
    pub fn read(&self, t: usize) -> Result<&[u8]> {
        let mut current = t;
        for _ in 0..=self.slots.len() {
            let slot = self.slot(current)?;
            match &slot.state {
                BufferState::Released { owner } => {
                    current = *owner;
                    continue;
                }
                _ if !slot.valid => return Err(RuntimeError::MissingBuffer { tensor: current }),
                BufferState::Unbound => return Err(RuntimeError::MissingBuffer { tensor: current }),
                BufferState::Constant(b) | BufferState::External(b) => return Ok(b.as_bytes()),
                BufferState::Dynamic(b) => return Ok(b.as_bytes()),
                BufferState::Arena(range) => {
                    return ArenaView::Whole(self.arena.as_bytes()).get(range.clone(), current)
                }
            }
        }
        Err(RuntimeError::invariant(format!(
            "release chain starting at tensor {t} does not terminate"
        )))
    }

    pub(crate) fn mark_valid(&mut self, t: usize) -> Result<()> {
        self.slot_mut(t)?.valid = true;
        Ok(())
    }

    /// Replaces a dynamic tensor's buffer with a fresh one sized for `shape`.
    /// The previous buffer is freed before the new one is allocated.
    pub(crate) fn resize_dynamic(&mut self, t: usize, shape: Shape) -> Result<()> {
        shape.check_rank()?;
        let limit = self.dynamic_limit;
        let subgraph = self.subgraph;
        let slot = self.slot_mut(t)?;
        if slot.role != TensorRole::Dynamic {
            return Err(RuntimeError::invariant(format!("tensor {t} is not dynamic")));
        }
        let bytes = shape.numel() * slot.dtype.size_in_bytes();
        if let Some(limit) = limit {
            if bytes > limit {
                return Err(RuntimeError::DynamicLimitExceeded {
                    tensor: t,
                    bytes,
                    limit,
                });
            }
        }
        slot.state = BufferState::Unbound;
        slot.valid = false;
        let buf = AlignedBuf::zeroed(bytes).map_err(|_| RuntimeError::AllocationFailure { bytes })?;
        debug!("subgraph {subgraph}: tensor {t} reallocated as {shape} ({bytes} bytes)");
        slot.state = BufferState::Dynamic(buf);
        slot.shape = shape;
        Ok(())
    }

    /// Hands `input`'s arena buffer to `output`. The input is left released
    /// and no longer claims any storage.
    pub(crate) fn transfer_in_place(&mut self, input: usize, output: usize) -> Result<()> {
        let in_slot = self.slot(input)?;
        let range = match &in_slot.state {
            BufferState::Arena(range) => range.clone(),
            BufferState::Released { owner } => {
                return Err(RuntimeError::invariant(format!(
                    "tensor {input} was already released to tensor {owner}"
                )))
            }
            other => {
                return Err(RuntimeError::invariant(format!(
                    "tensor {input} in state {} cannot be reused in place",
                    state_name(other)
                )))
            }
        };
        if !in_slot.valid {
            return Err(RuntimeError::MissingBuffer { tensor: input });
        }
        let out_slot = self.slot_mut(output)?;
        if out_slot.role == TensorRole::Dynamic || out_slot.byte_size() != range.len() {
            return Err(RuntimeError::invariant(format!(
                "tensor {output} cannot alias the buffer of tensor {input}"
            )));
        }
        out_slot.state = BufferState::Arena(range);
        out_slot.valid = true;
        let in_slot = self.slot_mut(input)?;
        in_slot.state = BufferState::Released { owner: output };
        in_slot.valid = false;
        Ok(())
    }

    /// Resolves read views for `inputs` and the write view for `output`.
    ///
    /// Inputs released to `output` resolve to [`Operand::Output`].
    pub(crate) fn io(&mut self, inputs: &[Option<usize>], output: usize) -> Result<IoViews<'_>> {
        if inputs.len() > MAX_KERNEL_INPUTS {
            return Err(RuntimeError::invariant(format!(
                "{} inputs exceed the kernel view limit",
                inputs.len()
            )));
        }
        if output >= self.slots.len() {
            return Err(RuntimeError::invariant(format!("output tensor {output} out of range")));
        }

        let (left, rest) = self.slots.split_at_mut(output);
        let (out_slot, right) = rest
            .split_first_mut()
            .ok_or_else(|| RuntimeError::invariant("empty slot split"))?;
        let TensorSlot {
            state,
            shape,
            dtype,
            ..
        } = out_slot;
        let out_dtype = *dtype;
        let out_shape: &Shape = shape;

        let (arena, out_bytes) = match state {
            BufferState::Arena(range) => {
                let range = range.clone();
                let bytes = self.arena.as_bytes_mut();
                if range.end > bytes.len() {
                    return Err(RuntimeError::invariant(format!(
                        "range of tensor {output} outside arena"
                    )));
                }
                let (head, rest) = bytes.split_at_mut(range.start);
                let (out, tail) = rest.split_at_mut(range.len());
                let view = ArenaView::Split {
                    head,
                    tail,
                    tail_start: range.end,
                };
                (view, out)
            }
            BufferState::Dynamic(buf) => (ArenaView::Whole(self.arena.as_bytes()), buf.as_bytes_mut()),
            _ => return Err(RuntimeError::MissingBuffer { tensor: output }),
        };

        let reader = SlotReader {
            arena,
            left,
            right,
            output,
        };
        let mut views: [Option<InputView<'_>>; MAX_KERNEL_INPUTS] = [None; MAX_KERNEL_INPUTS];
        for (view, t) in views.iter_mut().zip(inputs.iter()) {
            if let Some(t) = t {
                *view = Some(reader.input(*t)?);
            }
        }

        Ok(IoViews {
            inputs: views,
            output: OutputView {
                index: output,
                bytes: out_bytes,
                shape: out_shape,
                dtype: out_dtype,
            },
        })
    }

    /// Address of the storage a tensor currently claims, if any.
    pub fn buffer_address(&self, t: usize) -> Option<usize> {
        let slot = self.slots.get(t)?;
        match &slot.state {
            BufferState::Arena(range) => Some(self.arena.as_bytes().as_ptr() as usize + range.start),
            BufferState::Constant(b) | BufferState::External(b) => Some(b.as_bytes().as_ptr() as usize),
            BufferState::Dynamic(b) => Some(b.as_bytes().as_ptr() as usize),
            BufferState::Unbound | BufferState::Released { .. } => None,
        }
    }

    /// Tensors whose current storage starts at `address`.
    pub fn holders(&self, address: usize) -> Vec<usize> {
        (0..self.slots.len())
            .filter(|&t| self.buffer_address(t) == Some(address))
            .collect()
    }
}

struct SlotReader<'a> {
    arena: ArenaView<'a>,
    left: &'a [TensorSlot],
    right: &'a [TensorSlot],
    output: usize,
}

impl<'a> SlotReader<'a> {
    fn input(&self, t: usize) -> Result<InputView<'a>> {
        let slot = if t < self.output {
            self.left.get(t)
        } else if t > self.output {
            self.right.get(t - self.output - 1)
        } else {
            return Err(RuntimeError::invariant(format!(
                "tensor {t} is both an input and the output"
            )));
        }
        .ok_or_else(|| RuntimeError::invariant(format!("input tensor {t} out of range")))?;

        let bytes = match &slot.state {
            BufferState::Released { owner } if *owner == self.output => Operand::Output,
            BufferState::Released { owner } => {
                return Err(RuntimeError::invariant(format!(
                    "tensor {t} was released to tensor {owner}"
                )))
            }
            _ if !slot.valid => return Err(RuntimeError::MissingBuffer { tensor: t }),
            BufferState::Unbound => return Err(RuntimeError::MissingBuffer { tensor: t }),
            BufferState::Constant(b) | BufferState::External(b) => Operand::Slice(b.as_bytes()),
            BufferState::Dynamic(b) => Operand::Slice(b.as_bytes()),
            BufferState::Arena(range) => Operand::Slice(self.arena.get(range.clone(), t)?),
        };
        Ok(InputView {
            index: t,
            bytes,
            shape: &slot.shape,
            dtype: slot.dtype,
        })
    }
}

fn state_name(state: &BufferState) -> &'static str {
    match state {
        BufferState::Unbound => "unbound",
        BufferState::Constant(_) => "constant",
        BufferState::Arena(_) => "arena",
        BufferState::External(_) => "external",
        BufferState::Dynamic(_) => "dynamic",
        BufferState::Released { .. } => "released",
    }
}
