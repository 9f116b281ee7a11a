//! Kernel access helpers.
//!
//! Each helper resolves tensor indices from an operator once and hands out
//! typed views during execute, so kernel bodies never see how a tensor is
//! stored.

pub mod broadcast;
pub mod miso;
pub mod siso;
pub mod tiso;
pub mod view;

pub use broadcast::{binary_map, binary_same, BroadcastKind, BroadcastPlan};
pub use miso::{MisoData, MisoKernel};
pub use siso::{SisoData, SisoKernel};
pub use tiso::{TisoData, TisoKernel};
pub use view::{InputView, Operand, OutputView};

use mi_tensor::Shape;

use crate::error::{Result, RuntimeError};
use crate::executor::ExecutionContext;

/// Makes `output` ready to receive a result of `shape`: dynamic tensors are
/// reallocated, static ones must already have that shape.
pub fn prepare_output(ctx: &mut ExecutionContext<'_>, output: usize, shape: Shape) -> Result<()> {
    if ctx.is_dynamic(output) {
        return ctx.resize_dynamic(output, shape);
    }
    let current = ctx.shape(output)?;
    if current != &shape {
        return Err(RuntimeError::ShapeMismatch {
            tensor: output,
            expected: current.dims().to_vec(),
            got: shape.dims().to_vec(),
        });
    }
    Ok(())
}

pub(crate) fn check_len(len: usize, shape: &Shape, what: &str) -> Result<()> {
    if len != shape.numel() {
        return Err(RuntimeError::invariant(format!(
            "{what} holds {len} elements but its shape {shape} needs {}",
            shape.numel()
        )));
    }
    Ok(())
}
