//! RESHAPE.
//!
//! The new shape comes from the optional shape tensor, else the options,
//! else the output descriptor. A non-constant shape tensor makes the output
//! dynamic.

use mi_tensor::Shape;

use crate::access::{prepare_output, Operand, SisoKernel};
use crate::buffers::InPlaceSupport;
use crate::error::{Result, RuntimeError};
use crate::executor::{ConfigureContext, ExecutionContext};
use crate::graph::{OpCode, OpOptions, Operator};
use crate::kernels::{expect_vector, index_values, OpData};
use crate::registry::KernelRegistration;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReshapeData {
    /// Resolved output shape, `None` when it is known only at execute.
    pub shape: Option<Shape>,
}

pub fn register_reshape() -> KernelRegistration {
    KernelRegistration {
        name: OpCode::Reshape.name(),
        configure,
        execute,
        in_place: InPlaceSupport::FirstInput,
    }
}

/// Resolves a requested shape against `numel` elements. At most one entry
/// may be `-1`, inferred from the rest.
pub fn resolve_shape(requested: &[i64], numel: usize) -> Result<Shape> {
    let mut inferred = None;
    let mut known = 1usize;
    let mut dims = Vec::with_capacity(requested.len());
    for (axis, &d) in requested.iter().enumerate() {
        match d {
            -1 if inferred.is_none() => {
                inferred = Some(axis);
                dims.push(0);
            }
            -1 => {
                return Err(RuntimeError::InvalidShape(
                    "reshape allows at most one inferred dimension".into(),
                ))
            }
            d if d >= 0 => {
                let dim = usize::try_from(d).ok();
                known = dim
                    .and_then(|dim| known.checked_mul(dim))
                    .ok_or_else(|| RuntimeError::InvalidShape(format!("shape {requested:?} overflows")))?;
                dims.push(d as usize);
            }
            d => return Err(RuntimeError::InvalidShape(format!("negative dimension {d}"))),
        }
    }
    if let Some(axis) = inferred {
        if known == 0 || numel % known != 0 {
            return Err(RuntimeError::InvalidShape(format!(
                "cannot infer a dimension of {requested:?} for {numel} elements"
            )));
        }
        dims[axis] = numel / known;
    }
    let shape = Shape::new(dims);
    if shape.numel() != numel {
        return Err(RuntimeError::InvalidShape(format!(
            "cannot reshape {numel} elements to {shape}"
        )));
    }
    shape.check_rank()?;
    Ok(shape)
}

fn configure(ctx: &mut ConfigureContext<'_>, op: &Operator) -> Result<OpData> {
    let k = SisoKernel::new(op)?;
    let dtype = ctx.dtype(k.input)?;
    ctx.expect_dtype(k.output, dtype)?;

    let requested: Option<Vec<i64>> = match op.input(1) {
        Some(t) => {
            expect_vector(ctx, t)?;
            match ctx.constant_data(t) {
                Some(bytes) => Some(index_values(bytes, ctx.dtype(t)?, t)?),
                None => {
                    ctx.mark_dynamic(k.output)?;
                    return Ok(OpData::Reshape(ReshapeData::default()));
                }
            }
        }
        None => match &op.options {
            OpOptions::Reshape {
                new_shape: Some(dims),
            } => Some(dims.iter().map(|&d| d as i64).collect()),
            _ => None,
        },
    };

    if ctx.is_dynamic(k.input) {
        ctx.mark_dynamic(k.output)?;
        return Ok(OpData::Reshape(ReshapeData::default()));
    }
    let numel = ctx.shape(k.input)?.numel();
    let shape = match requested {
        Some(dims) => resolve_shape(&dims, numel)?,
        None => {
            let shape = ctx.shape(k.output)?.clone();
            resolve_shape(&shape.dims().iter().map(|&d| d as i64).collect::<Vec<_>>(), numel)?
        }
    };
    if ctx.is_dynamic(k.output) {
        return Ok(OpData::Reshape(ReshapeData::default()));
    }
    ctx.expect_shape(k.output, &shape)?;
    Ok(OpData::Reshape(ReshapeData { shape: Some(shape) }))
}

fn requested_at_execute(ctx: &ExecutionContext<'_>, op: &Operator) -> Result<Vec<i64>> {
    if let Some(t) = op.input(1) {
        return index_values(ctx.read(t)?, ctx.dtype(t)?, t);
    }
    match &op.options {
        OpOptions::Reshape {
            new_shape: Some(dims),
        } => Ok(dims.iter().map(|&d| d as i64).collect()),
        _ => Err(RuntimeError::InvalidShape(
            "a dynamic reshape needs a shape tensor or options".into(),
        )),
    }
}

fn execute(ctx: &mut ExecutionContext<'_>, op: &Operator, data: &OpData) -> Result<()> {
    let OpData::Reshape(params) = data else {
        return Err(RuntimeError::invariant("reshape kernel without reshape data"));
    };
    let k = SisoKernel::new(op)?;
    if params.shape.is_none() && ctx.is_dynamic(k.output) {
        let requested = requested_at_execute(ctx, op)?;
        let shape = resolve_shape(&requested, ctx.shape(k.input)?.numel())?;
        prepare_output(ctx, k.output, shape)?;
    }
    let d = k.read_data(ctx)?;
    if d.input.dtype != d.output.dtype {
        return Err(RuntimeError::TypeMismatch {
            tensor: d.output.index,
            expected: d.input.dtype,
            got: d.output.dtype,
        });
    }
    match d.input.bytes {
        Operand::Output => Ok(()),
        Operand::Slice(bytes) => {
            if bytes.len() != d.output.bytes.len() {
                return Err(RuntimeError::invariant(format!(
                    "reshape of {} bytes into {}",
                    bytes.len(),
                    d.output.bytes.len()
                )));
            }
            d.output.bytes.copy_from_slice(bytes);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_infers_one_dimension() {
        assert_eq!(resolve_shape(&[2, -1], 6).unwrap(), Shape::from([2, 3]));
        assert_eq!(resolve_shape(&[-1], 6).unwrap(), Shape::from([6]));
    }

    #[test]
    fn test_resolve_rejects_bad_requests() {
        assert!(resolve_shape(&[-1, -1], 6).is_err());
        assert!(resolve_shape(&[4, -1], 6).is_err());
        assert!(resolve_shape(&[2, 2], 6).is_err());
        assert!(resolve_shape(&[-2, 3], 6).is_err());
    }

    #[test]
    fn test_resolve_rejects_overflowing_dims() {
        assert!(matches!(
            resolve_shape(&[i64::MAX, 4], 6),
            Err(RuntimeError::InvalidShape(_))
        ));
        assert!(resolve_shape(&[i64::MAX, i64::MAX, -1], 6).is_err());
    }
}
