//! Greedy first-fit arena planning.
//!
//! Buffers are placed largest first at the lowest aligned offset that does not
//! collide with an already placed buffer whose lifetime overlaps. Lifetimes
//! are inclusive operator index ranges.

use std::ops::Range;

use crate::buffers::arena::align_up;
use crate::buffers::manager::BufferManager;
use crate::buffers::TensorRole;
use crate::error::Result;
use crate::graph::Subgraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRequest {
    pub size: usize,
    pub first_use: usize,
    pub last_use: usize,
}

impl BufferRequest {
    fn overlaps(&self, other: &BufferRequest) -> bool {
        self.first_use <= other.last_use && other.first_use <= self.last_use
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArenaPlan {
    /// Offset of each request, in request order.
    pub offsets: Vec<usize>,
    /// Total arena size, aligned.
    pub size: usize,
}

pub fn plan_greedy(requests: &[BufferRequest], alignment: usize) -> ArenaPlan {
    let mut order: Vec<usize> = (0..requests.len()).collect();
    order.sort_by(|&a, &b| {
        requests[b]
            .size
            .cmp(&requests[a].size)
            .then(requests[a].first_use.cmp(&requests[b].first_use))
            .then(a.cmp(&b))
    });

    let mut offsets = vec![0usize; requests.len()];
    let mut placed: Vec<usize> = Vec::with_capacity(requests.len());
    let mut high_water = 0usize;

    for &r in &order {
        let req = &requests[r];
        if req.size == 0 {
            continue;
        }
        let mut taken: Vec<(usize, usize)> = placed
            .iter()
            .filter(|&&p| requests[p].overlaps(req))
            .map(|&p| (offsets[p], offsets[p] + requests[p].size))
            .collect();
        taken.sort_unstable();

        let mut candidate = 0usize;
        for (start, end) in taken {
            if candidate + req.size <= start {
                break;
            }
            candidate = candidate.max(align_up(end, alignment));
        }
        offsets[r] = candidate;
        high_water = high_water.max(candidate + req.size);
        placed.push(r);
    }

    ArenaPlan {
        offsets,
        size: align_up(high_water, alignment),
    }
}

/// Arena placement for every planned tensor of one subgraph.
#[derive(Debug, Clone, Default)]
pub(crate) struct ArenaLayout {
    pub size: usize,
    pub ranges: Vec<Option<Range<usize>>>,
}

/// Computes tensor lifetimes, merges in-place pairs into one buffer and plans
/// the arena.
///
/// `aliases[i]` lists the `(input, output)` pairs operator `i` runs in place.
/// Declared inputs are live from the first operator and declared outputs
/// until after the last one.
pub(crate) fn plan_subgraph(
    subgraph: &Subgraph,
    buffers: &BufferManager,
    aliases: &[Vec<(usize, usize)>],
    alignment: usize,
) -> Result<ArenaLayout> {
    let n_tensors = subgraph.tensors.len();
    let n_ops = subgraph.operators.len();

    let mut lifetime: Vec<Option<(usize, usize)>> = vec![None; n_tensors];
    let mut touch = |t: usize, at: usize| {
        let entry = lifetime[t].get_or_insert((at, at));
        entry.0 = entry.0.min(at);
        entry.1 = entry.1.max(at);
    };
    for (i, op) in subgraph.operators.iter().enumerate() {
        for &t in op.inputs.iter().flatten().chain(op.outputs.iter()) {
            touch(t, i);
        }
    }
    for &t in &subgraph.inputs {
        touch(t, 0);
    }
    for &t in &subgraph.outputs {
        touch(t, n_ops);
    }

    let mut root: Vec<usize> = (0..n_tensors).collect();
    for pairs in aliases {
        for &(input, output) in pairs {
            root[output] = root[input];
        }
    }

    let planned = |t: usize| {
        matches!(
            buffers.role(t),
            Ok(TensorRole::Input) | Ok(TensorRole::Intermediate)
        )
    };

    let mut group: Vec<Option<BufferRequest>> = vec![None; n_tensors];
    for t in (0..n_tensors).filter(|&t| planned(t)) {
        let (first, last) = lifetime[t].unwrap_or((0, n_ops));
        let size = buffers.byte_size(t)?;
        let entry = group[root[t]].get_or_insert(BufferRequest {
            size,
            first_use: first,
            last_use: last,
        });
        entry.size = entry.size.max(size);
        entry.first_use = entry.first_use.min(first);
        entry.last_use = entry.last_use.max(last);
    }

    let roots: Vec<usize> = (0..n_tensors).filter(|&t| group[t].is_some()).collect();
    let requests: Vec<BufferRequest> = roots.iter().filter_map(|&t| group[t]).collect();
    let plan = plan_greedy(&requests, alignment);

    let mut offset_of = vec![None; n_tensors];
    for (&t, &offset) in roots.iter().zip(plan.offsets.iter()) {
        offset_of[t] = Some(offset);
    }

    let mut ranges = vec![None; n_tensors];
    for t in (0..n_tensors).filter(|&t| planned(t)) {
        if let Some(offset) = offset_of[root[t]] {
            ranges[t] = Some(offset..offset + buffers.byte_size(t)?);
        }
    }

    Ok(ArenaLayout {
        size: plan.size,
        ranges,
    })
}
