use crate::error::{Result, TensorError};
use std::fmt;

/// Largest rank a tensor may have.
pub const MAX_RANK: usize = 6;

/// A tensor shape, wrapping a vector of dimension sizes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// Create a new shape from a vector of dimensions.
    pub fn new(dims: Vec<usize>) -> Self {
        Shape { dims }
    }

    /// Create a shape from a slice of dimensions.
    pub fn from_slice(dims: &[usize]) -> Self {
        Shape {
            dims: dims.to_vec(),
        }
    }

    /// The rank-0 shape of a single value.
    pub fn scalar() -> Self {
        Shape { dims: Vec::new() }
    }

    /// Number of dimensions (rank).
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements (product of all dimension sizes).
    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }

    /// Returns the size of dimension `i`.
    ///
    /// # Panics
    /// Panics if `i >= ndim()`.
    pub fn dim(&self, i: usize) -> usize {
        self.dims[i]
    }

    /// Returns a reference to the underlying dimension sizes.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Fails with `RankTooLarge` if the shape exceeds [`MAX_RANK`].
    pub fn check_rank(&self) -> Result<()> {
        if self.ndim() > MAX_RANK {
            return Err(TensorError::RankTooLarge {
                rank: self.ndim(),
                max: MAX_RANK,
            });
        }
        Ok(())
    }

    /// Computes row-major contiguous strides for this shape.
    ///
    /// For a shape [d0, d1, d2], the strides are [d1*d2, d2, 1].
    pub fn strides(&self) -> Vec<usize> {
        if self.dims.is_empty() {
            return vec![];
        }
        let mut strides = vec![0usize; self.dims.len()];
        strides[self.dims.len() - 1] = 1;
        for i in (0..self.dims.len() - 1).rev() {
            strides[i] = strides[i + 1] * self.dims[i + 1];
        }
        strides
    }

    /// Returns this shape left-padded with ones up to `rank` dimensions.
    ///
    /// Shapes already at or above `rank` are returned unchanged.
    pub fn with_rank(&self, rank: usize) -> Shape {
        if self.ndim() >= rank {
            return self.clone();
        }
        let mut dims = vec![1usize; rank - self.ndim()];
        dims.extend_from_slice(&self.dims);
        Shape::new(dims)
    }

    /// Compute the broadcast shape of `a` and `b` using numpy-style broadcasting rules.
    ///
    /// Rules:
    /// 1. If the shapes have different numbers of dimensions, the shorter shape is
    ///    padded with ones on the left.
    /// 2. For each dimension, sizes must either be equal, or one of them must be 1.
    ///    The output dimension is the maximum of the two.
    pub fn broadcast_shape(a: &Shape, b: &Shape) -> Result<Shape> {
        let max_ndim = a.ndim().max(b.ndim());
        let mut result = Vec::with_capacity(max_ndim);

        for i in 0..max_ndim {
            // Index from the right: dim at position (ndim - 1 - i) from the right
            let da = if i < a.ndim() {
                a.dims[a.ndim() - 1 - i]
            } else {
                1
            };
            let db = if i < b.ndim() {
                b.dims[b.ndim() - 1 - i]
            } else {
                1
            };

            if da == db {
                result.push(da);
            } else if da == 1 {
                result.push(db);
            } else if db == 1 {
                result.push(da);
            } else {
                return Err(TensorError::BroadcastError {
                    a: a.dims.clone(),
                    b: b.dims.clone(),
                });
            }
        }

        result.reverse();
        Ok(Shape::new(result))
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape::new(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::from_slice(dims)
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Shape::new(dims.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_shape() {
        let s = Shape::new(vec![2, 3, 4]);
        assert_eq!(s.ndim(), 3);
        assert_eq!(s.numel(), 24);
        assert_eq!(s.dim(0), 2);
        assert_eq!(s.dim(1), 3);
        assert_eq!(s.dim(2), 4);
    }

    #[test]
    fn test_strides() {
        let s = Shape::new(vec![2, 3, 4]);
        assert_eq!(s.strides(), vec![12, 4, 1]);
    }

    #[test]
    fn test_scalar_shape() {
        let s = Shape::scalar();
        assert_eq!(s.ndim(), 0);
        assert_eq!(s.numel(), 1); // product of empty = 1
        assert_eq!(s.strides(), vec![]);
    }

    #[test]
    fn test_zero_sized_dim() {
        let s = Shape::from([3, 0, 2]);
        assert_eq!(s.numel(), 0);
    }

    #[test]
    fn test_with_rank() {
        let s = Shape::from([3, 4]);
        assert_eq!(s.with_rank(4).dims(), &[1, 1, 3, 4]);
        assert_eq!(s.with_rank(1).dims(), &[3, 4]);
    }

    #[test]
    fn test_check_rank() {
        assert!(Shape::from([1, 1, 1, 1, 1, 1]).check_rank().is_ok());
        assert!(matches!(
            Shape::from([1, 1, 1, 1, 1, 1, 1]).check_rank(),
            Err(TensorError::RankTooLarge { rank: 7, max: 6 })
        ));
    }

    #[test]
    fn test_broadcast_same() {
        let a = Shape::new(vec![2, 3]);
        let b = Shape::new(vec![2, 3]);
        let c = Shape::broadcast_shape(&a, &b).unwrap();
        assert_eq!(c.dims(), &[2, 3]);
    }

    #[test]
    fn test_broadcast_expand() {
        let a = Shape::new(vec![2, 1]);
        let b = Shape::new(vec![1, 3]);
        let c = Shape::broadcast_shape(&a, &b).unwrap();
        assert_eq!(c.dims(), &[2, 3]);
    }

    #[test]
    fn test_broadcast_different_ndim() {
        let a = Shape::new(vec![3]);
        let b = Shape::new(vec![2, 3]);
        let c = Shape::broadcast_shape(&a, &b).unwrap();
        assert_eq!(c.dims(), &[2, 3]);
    }

    #[test]
    fn test_broadcast_scalar() {
        let c = Shape::broadcast_shape(&Shape::scalar(), &Shape::from([4, 5])).unwrap();
        assert_eq!(c.dims(), &[4, 5]);
    }

    #[test]
    fn test_broadcast_error() {
        let a = Shape::new(vec![2, 3]);
        let b = Shape::new(vec![2, 4]);
        assert!(matches!(
            Shape::broadcast_shape(&a, &b),
            Err(TensorError::BroadcastError { .. })
        ));
    }
}
