//! Broadcast iteration for elementwise kernels.
//!
//! Inputs are left-padded to the output rank; a size-1 axis gets stride 0 so
//! the same element is revisited along it.

use mi_tensor::{Shape, MAX_RANK};

use crate::access::check_len;
use crate::access::view::Operand;
use crate::error::{Result, RuntimeError};

/// Which loop an elementwise binary kernel runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastKind {
    /// Both inputs already have the output's element count.
    Elementwise,
    /// The first input is a single value.
    ScalarLhs,
    /// The second input is a single value.
    ScalarRhs,
    General,
}

impl BroadcastKind {
    pub fn classify(a: &Shape, b: &Shape, out: &Shape) -> Self {
        let n = out.numel();
        match (a.numel(), b.numel()) {
            (x, y) if x == n && y == n => BroadcastKind::Elementwise,
            (1, y) if y == n => BroadcastKind::ScalarLhs,
            (x, 1) if x == n => BroadcastKind::ScalarRhs,
            _ => BroadcastKind::General,
        }
    }
}

/// Odometer over an output shape yielding, for every output element, the
/// flat index of the matching element in each of `N` inputs.
#[derive(Debug, Clone)]
pub struct BroadcastPlan<const N: usize> {
    dims: [usize; MAX_RANK],
    strides: [[usize; MAX_RANK]; N],
    rank: usize,
    numel: usize,
}

impl<const N: usize> BroadcastPlan<N> {
    /// # Errors
    ///
    /// `ShapeMismatch` if some input cannot be broadcast to `output`.
    pub fn new(inputs: [&Shape; N], output: &Shape) -> Result<Self> {
        output.check_rank()?;
        let rank = output.ndim();
        let mut dims = [1usize; MAX_RANK];
        dims[..rank].copy_from_slice(output.dims());

        let mut strides = [[0usize; MAX_RANK]; N];
        for (k, input) in inputs.iter().enumerate() {
            if input.ndim() > rank {
                return Err(mismatch(input, output));
            }
            let padded = input.with_rank(rank);
            let mut stride = 1usize;
            for axis in (0..rank).rev() {
                let d = padded.dim(axis);
                if d == dims[axis] && d != 1 {
                    strides[k][axis] = stride;
                } else if d != 1 {
                    return Err(mismatch(input, output));
                }
                stride *= d;
            }
        }

        Ok(BroadcastPlan {
            dims,
            strides,
            rank,
            numel: output.numel(),
        })
    }

    pub fn numel(&self) -> usize {
        self.numel
    }

    /// Calls `f(output_index, input_indices)` for every output element in
    /// row-major order.
    pub fn for_each(&self, mut f: impl FnMut(usize, [usize; N])) {
        let mut counters = [0usize; MAX_RANK];
        let mut offsets = [0usize; N];
        for out in 0..self.numel {
            f(out, offsets);
            let mut axis = self.rank;
            while axis > 0 {
                axis -= 1;
                counters[axis] += 1;
                for (offset, stride) in offsets.iter_mut().zip(self.strides.iter()) {
                    *offset += stride[axis];
                }
                if counters[axis] < self.dims[axis] {
                    break;
                }
                for (offset, stride) in offsets.iter_mut().zip(self.strides.iter()) {
                    *offset -= stride[axis] * self.dims[axis];
                }
                counters[axis] = 0;
            }
        }
    }
}

fn mismatch(input: &Shape, output: &Shape) -> RuntimeError {
    RuntimeError::InvalidShape(format!("cannot broadcast {input} to {output}"))
}

/// `out[i] = f(a[i'], b[i''])` with broadcasting. Either operand may alias
/// `out`.
pub fn binary_same<T: Copy>(
    a: Operand<'_, T>,
    a_shape: &Shape,
    b: Operand<'_, T>,
    b_shape: &Shape,
    out: &mut [T],
    out_shape: &Shape,
    f: impl Fn(T, T) -> T,
) -> Result<()> {
    check_len(out.len(), out_shape, "output")?;
    check_operand(&a, a_shape)?;
    check_operand(&b, b_shape)?;
    match BroadcastKind::classify(a_shape, b_shape, out_shape) {
        BroadcastKind::Elementwise => {
            for i in 0..out.len() {
                out[i] = f(a.at(out, i, i), b.at(out, i, i));
            }
        }
        BroadcastKind::ScalarLhs => {
            let x = a.at(out, 0, 0);
            for i in 0..out.len() {
                out[i] = f(x, b.at(out, i, i));
            }
        }
        BroadcastKind::ScalarRhs => {
            let y = b.at(out, 0, 0);
            for i in 0..out.len() {
                out[i] = f(a.at(out, i, i), y);
            }
        }
        BroadcastKind::General => {
            if a.is_output() || b.is_output() {
                return Err(RuntimeError::invariant(
                    "an aliased operand must have the output's shape",
                ));
            }
            let plan = BroadcastPlan::new([a_shape, b_shape], out_shape)?;
            plan.for_each(|o, [ia, ib]| out[o] = f(a.at(&[], ia, o), b.at(&[], ib, o)));
        }
    }
    Ok(())
}

/// `out[i] = f(a[i'], b[i''])` into an output of another element type.
pub fn binary_map<T: Copy, U>(
    a: &[T],
    a_shape: &Shape,
    b: &[T],
    b_shape: &Shape,
    out: &mut [U],
    out_shape: &Shape,
    f: impl Fn(T, T) -> U,
) -> Result<()> {
    check_len(out.len(), out_shape, "output")?;
    check_len(a.len(), a_shape, "first input")?;
    check_len(b.len(), b_shape, "second input")?;
    match BroadcastKind::classify(a_shape, b_shape, out_shape) {
        BroadcastKind::Elementwise => {
            for (o, (&x, &y)) in out.iter_mut().zip(a.iter().zip(b.iter())) {
                *o = f(x, y);
            }
        }
        BroadcastKind::ScalarLhs => {
            for (o, &y) in out.iter_mut().zip(b.iter()) {
                *o = f(a[0], y);
            }
        }
        BroadcastKind::ScalarRhs => {
            for (o, &x) in out.iter_mut().zip(a.iter()) {
                *o = f(x, b[0]);
            }
        }
        BroadcastKind::General => {
            let plan = BroadcastPlan::new([a_shape, b_shape], out_shape)?;
            plan.for_each(|o, [ia, ib]| out[o] = f(a[ia], b[ib]));
        }
    }
    Ok(())
}

fn check_operand<T>(operand: &Operand<'_, T>, shape: &Shape) -> Result<()> {
    match operand {
        Operand::Slice(s) => check_len(s.len(), shape, "input"),
        Operand::Output => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn s(dims: &[usize]) -> Shape {
        Shape::from_slice(dims)
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            BroadcastKind::classify(&s(&[2, 2]), &s(&[2, 2]), &s(&[2, 2])),
            BroadcastKind::Elementwise
        );
        assert_eq!(
            BroadcastKind::classify(&s(&[]), &s(&[3]), &s(&[3])),
            BroadcastKind::ScalarLhs
        );
        assert_eq!(
            BroadcastKind::classify(&s(&[2, 3]), &s(&[1]), &s(&[2, 3])),
            BroadcastKind::ScalarRhs
        );
        assert_eq!(
            BroadcastKind::classify(&s(&[2, 1]), &s(&[1, 3]), &s(&[2, 3])),
            BroadcastKind::General
        );
    }

    #[test]
    fn test_outer_sum() {
        let a = [1.0f32, 2.0];
        let b = [10.0f32, 20.0, 30.0];
        let mut out = [0.0f32; 6];
        binary_same(
            Operand::Slice(&a),
            &s(&[2, 1]),
            Operand::Slice(&b),
            &s(&[3]),
            &mut out,
            &s(&[2, 3]),
            |x, y| x + y,
        )
        .unwrap();
        assert_eq!(out, [11.0, 21.0, 31.0, 12.0, 22.0, 32.0]);
    }

    #[test]
    fn test_in_place_operand() {
        let b = [1i32, 2, 3];
        let mut out = [10i32, 20, 30];
        binary_same(
            Operand::Output,
            &s(&[3]),
            Operand::Slice(&b),
            &s(&[3]),
            &mut out,
            &s(&[3]),
            |x, y| x - y,
        )
        .unwrap();
        assert_eq!(out, [9, 18, 27]);
    }

    #[test]
    fn test_incompatible_plan() {
        assert!(BroadcastPlan::new([&s(&[2, 3]), &s(&[4])], &s(&[2, 3])).is_err());
        assert!(BroadcastPlan::new([&s(&[1, 2, 3])], &s(&[2, 3])).is_err());
    }

    #[test]
    fn test_map_to_bool() {
        let a = [1i32, 5, 3];
        let b = [3i32];
        let mut out = [0u8; 3];
        binary_map(&a, &s(&[3]), &b, &s(&[]), &mut out, &s(&[3]), |x, y| (x < y) as u8).unwrap();
        assert_eq!(out, [1, 0, 0]);
    }

    fn reference_index(out_index: usize, out_dims: &[usize], in_dims: &[usize]) -> usize {
        let rank = out_dims.len();
        let padded: Vec<usize> = std::iter::repeat(1)
            .take(rank - in_dims.len())
            .chain(in_dims.iter().copied())
            .collect();
        let mut rem = out_index;
        let mut coords = vec![0usize; rank];
        for axis in (0..rank).rev() {
            coords[axis] = rem % out_dims[axis];
            rem /= out_dims[axis];
        }
        let mut flat = 0;
        for axis in 0..rank {
            let c = if padded[axis] == 1 { 0 } else { coords[axis] };
            flat = flat * padded[axis] + c;
        }
        flat
    }

    fn compatible_pair() -> impl Strategy<Value = (Vec<usize>, Vec<usize>)> {
        prop::collection::vec((1usize..4, 0u8..3), 0..5).prop_map(|axes| {
            let mut a = Vec::new();
            let mut b = Vec::new();
            for (d, mode) in axes {
                match mode {
                    0 => {
                        a.push(d);
                        b.push(d);
                    }
                    1 => {
                        a.push(1);
                        b.push(d);
                    }
                    _ => {
                        a.push(d);
                        b.push(1);
                    }
                }
            }
            (a, b)
        })
    }

    proptest! {
        #[test]
        fn test_plan_matches_reference((a, b) in compatible_pair(), drop_a in 0usize..3) {
            // Dropping leading axes exercises rank extension.
            let a: Vec<usize> = a.iter().copied().skip(drop_a.min(a.len())).collect();
            let sa = Shape::from_slice(&a);
            let sb = Shape::from_slice(&b);
            let out = Shape::broadcast_shape(&sa, &sb).unwrap();
            let plan = BroadcastPlan::new([&sa, &sb], &out).unwrap();
            let mut visited = 0usize;
            plan.for_each(|o, [ia, ib]| {
                assert_eq!(ia, reference_index(o, out.dims(), sa.dims()));
                assert_eq!(ib, reference_index(o, out.dims(), sb.dims()));
                visited += 1;
            });
            prop_assert_eq!(visited, out.numel());
        }
    }
}
