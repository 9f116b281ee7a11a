use std::ops::Range;

use crate::error::{Result, RuntimeError};

/// Read-only view of a subgraph arena while one output range is borrowed
/// mutably.
#[derive(Debug)]
pub enum ArenaView<'a> {
    Whole(&'a [u8]),
    /// The arena minus `[head.len(), tail_start)`.
    Split {
        head: &'a [u8],
        tail: &'a [u8],
        tail_start: usize,
    },
}

impl<'a> ArenaView<'a> {
    /// Bytes of `range`, which must not intersect the borrowed output.
    pub fn get(&self, range: Range<usize>, tensor: usize) -> Result<&'a [u8]> {
        if range.is_empty() {
            return Ok(&[]);
        }
        let (start, end) = (range.start, range.end);
        let out_of_range = || {
            RuntimeError::invariant(format!(
                "arena range {start}..{end} of tensor {tensor} is not readable here"
            ))
        };
        match *self {
            ArenaView::Whole(bytes) => bytes.get(start..end).ok_or_else(out_of_range),
            ArenaView::Split {
                head,
                tail,
                tail_start,
            } => {
                if end <= head.len() {
                    Ok(&head[start..end])
                } else if start >= tail_start {
                    tail.get(start - tail_start..end - tail_start)
                        .ok_or_else(out_of_range)
                } else {
                    Err(out_of_range())
                }
            }
        }
    }
}

/// Rounds `value` up to a multiple of `alignment` (a power of two).
pub fn align_up(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 16), 0);
        assert_eq!(align_up(1, 16), 16);
        assert_eq!(align_up(16, 16), 16);
        assert_eq!(align_up(17, 8), 24);
    }

    #[test]
    fn test_split_view_rejects_output_overlap() {
        let bytes = [0u8, 1, 2, 3, 4, 5, 6, 7];
        let view = ArenaView::Split {
            head: &bytes[..2],
            tail: &bytes[6..],
            tail_start: 6,
        };
        assert_eq!(view.get(0..2, 0).unwrap(), &[0, 1]);
        assert_eq!(view.get(6..8, 0).unwrap(), &[6, 7]);
        assert!(view.get(1..3, 0).is_err());
        assert!(view.get(3..3, 0).unwrap().is_empty());
    }
}
