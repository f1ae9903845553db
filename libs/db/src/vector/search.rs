//! HNSW search: greedy upper-layer descent and base-layer best-first search.
//!
//! The algorithms are written against the `LayerGraph` seam so the same code
//! serves both the persistent index (adjacency read through the graph
//! adapter) and the in-memory origin index used for bulk seeding.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use anyhow::Result;
use ordered_float::OrderedFloat;
use roaring::RoaringBitmap;

use crate::graph::VertexId;

/// Layered adjacency plus distance evaluation, as seen by the search and
/// insertion algorithms.
///
/// `try_distance` returns `None` for vertices that no longer resolve (a
/// deleted vertex still referenced by a dangling edge); search skips them.
pub(crate) trait LayerGraph {
    /// Out-neighbors of `vertex` at `layer`, in ascending id order.
    fn neighbors(&self, vertex: VertexId, layer: u8) -> Result<Vec<VertexId>>;

    /// Distance from `query` to the stored vector of `vertex`.
    fn try_distance(&self, query: &[f32], vertex: VertexId) -> Result<Option<f32>>;

    /// Distance between the stored vectors of two vertices.
    fn distance_between(&self, a: VertexId, b: VertexId) -> Result<f32>;
}

/// A `(distance, vertex)` pair ordered by distance, ties broken by vertex id.
///
/// `BinaryHeap<Candidate>` is a max-heap keeping the farthest candidate on
/// top; wrap in `Reverse` for closest-first ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Candidate {
    pub dist: OrderedFloat<f32>,
    pub vertex: VertexId,
}

/// Greedy hill-climb at one layer: repeatedly move to the closest neighbor
/// until no out-neighbor improves on the current distance.
pub(crate) fn greedy_descent<G: LayerGraph>(
    graph: &G,
    query: &[f32],
    mut current: VertexId,
    mut current_dist: f32,
    layer: u8,
) -> Result<(VertexId, f32)> {
    let mut changed = true;
    while changed {
        changed = false;
        for neighbor in graph.neighbors(current, layer)? {
            let Some(dist) = graph.try_distance(query, neighbor)? else {
                continue;
            };
            if dist < current_dist {
                current = neighbor;
                current_dist = dist;
                changed = true;
            }
        }
    }
    Ok((current, current_dist))
}

/// Best-first search at one layer.
///
/// Maintains a closest-first candidate heap and a bounded farthest-first
/// result heap of size `k`. Terminates when the closest remaining candidate
/// is strictly farther than the current lower bound: the candidate heap is
/// a min-heap, so nothing left can improve a full result heap.
///
/// Returns the result heap (farthest on top), at most `k` entries.
pub(crate) fn search_base_layer<G: LayerGraph>(
    graph: &G,
    query: &[f32],
    entry: VertexId,
    k: usize,
    layer: u8,
) -> Result<BinaryHeap<Candidate>> {
    let mut top: BinaryHeap<Candidate> = BinaryHeap::new();
    let mut candidates: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
    let mut visited = RoaringBitmap::new();

    let Some(entry_dist) = graph.try_distance(query, entry)? else {
        return Ok(top);
    };

    let seed = Candidate {
        dist: OrderedFloat(entry_dist),
        vertex: entry,
    };
    top.push(seed);
    candidates.push(Reverse(seed));
    visited.insert(entry);
    let mut lower_bound = OrderedFloat(entry_dist);

    while let Some(Reverse(current)) = candidates.pop() {
        if current.dist > lower_bound {
            break;
        }

        for neighbor in graph.neighbors(current.vertex, layer)? {
            if !visited.insert(neighbor) {
                continue;
            }
            let Some(dist) = graph.try_distance(query, neighbor)? else {
                continue;
            };
            let dist = OrderedFloat(dist);

            if top.len() < k || dist < lower_bound {
                let candidate = Candidate {
                    dist,
                    vertex: neighbor,
                };
                candidates.push(Reverse(candidate));
                top.push(candidate);
                if top.len() > k {
                    top.pop();
                }
                if let Some(worst) = top.peek() {
                    lower_bound = worst.dist;
                }
            }
        }
    }

    Ok(top)
}

/// Full k-NN query: descend from the entry point through the upper layers,
/// then run the base-layer search with beam `max(ef, k)` and trim to `k`.
///
/// Returns candidates in ascending distance order.
pub(crate) fn find_nearest_in<G: LayerGraph>(
    graph: &G,
    entry: VertexId,
    entry_level: u8,
    query: &[f32],
    k: usize,
    ef: usize,
) -> Result<Vec<Candidate>> {
    let Some(mut current_dist) = graph.try_distance(query, entry)? else {
        return Ok(Vec::new());
    };
    let mut current = entry;

    for layer in (1..=entry_level).rev() {
        (current, current_dist) = greedy_descent(graph, query, current, current_dist, layer)?;
    }
    let _ = current_dist;

    let mut top = search_base_layer(graph, query, current, ef.max(k), 0)?;
    while top.len() > k {
        top.pop();
    }

    Ok(top.into_sorted_vec())
}
