//! Bounded top-k selection over `(distance, position)` candidates.

use super::arena::Arena;
use super::IndexResult;
use crate::metric::Metric;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Heap entry ordered by distance, then by position. The order is total,
/// so selection does not depend on scan order.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f32,
    position: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.position.cmp(&other.position))
    }
}

/// Keeps the `k` smallest candidates seen so far. The max-heap top is the
/// current worst kept candidate.
pub(crate) struct TopK {
    k: usize,
    heap: BinaryHeap<Candidate>,
}

impl TopK {
    pub(crate) fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k.saturating_add(1).min(4096)),
        }
    }

    pub(crate) fn push(&mut self, position: usize, distance: f32) {
        let candidate = Candidate { distance, position };
        if self.heap.len() < self.k {
            self.heap.push(candidate);
        } else if let Some(worst) = self.heap.peek() {
            if candidate < *worst {
                self.heap.pop();
                self.heap.push(candidate);
            }
        }
    }

    pub(crate) fn merge(mut self, other: TopK) -> TopK {
        for c in other.heap {
            self.push(c.position, c.distance);
        }
        self
    }

    /// Results ordered by ascending distance, ties by ascending position.
    pub(crate) fn into_results(self) -> Vec<IndexResult> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|c| IndexResult {
                position: c.position,
                distance: c.distance,
            })
            .collect()
    }
}

/// Exhaustive scan of `rows` (a range of arena positions).
pub(crate) fn scan(
    arena: &Arena,
    metric: Metric,
    query: &[f32],
    query_norm: f32,
    rows: std::ops::Range<usize>,
    k: usize,
) -> TopK {
    let mut top = TopK::new(k);
    for position in rows {
        let distance = metric.distance_with_norms(query, query_norm, arena.row(position), arena.norm(position));
        top.push(position, distance);
    }
    top
}
