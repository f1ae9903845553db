//! Neighbor selection heuristic ("Heuristic 2" of the HNSW paper).
//!
//! Keeps a candidate only when no already-kept neighbor is closer to it
//! than the query is. This prefers neighbors spread over distinct
//! directions of the local neighborhood, which preserves long-range
//! navigability at bounded degree.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use anyhow::Result;
use ordered_float::OrderedFloat;

use super::search::{Candidate, LayerGraph};

/// Prune `candidates` down to at most `m` diverse members, in place.
///
/// Queues with fewer than `m` entries are returned unchanged. The candidate
/// distances are relative to the query point of the caller; pairwise
/// distances come from the graph.
pub(crate) fn select_neighbors<G: LayerGraph>(
    graph: &G,
    candidates: &mut BinaryHeap<Candidate>,
    m: usize,
) -> Result<()> {
    if candidates.len() < m {
        return Ok(());
    }

    let mut closest: BinaryHeap<Reverse<Candidate>> =
        candidates.drain().map(Reverse).collect();
    let mut kept: Vec<Candidate> = Vec::with_capacity(m);

    while let Some(Reverse(candidate)) = closest.pop() {
        if kept.len() >= m {
            break;
        }

        let mut diverse = true;
        for existing in &kept {
            let between = graph.distance_between(existing.vertex, candidate.vertex)?;
            if OrderedFloat(between) < candidate.dist {
                diverse = false;
                break;
            }
        }
        if diverse {
            kept.push(candidate);
        }
    }

    candidates.extend(kept);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::VertexId;
    use crate::vector::Distance;

    struct Points(Vec<Vec<f32>>);

    impl LayerGraph for Points {
        fn neighbors(&self, _vertex: VertexId, _layer: u8) -> Result<Vec<VertexId>> {
            Ok(Vec::new())
        }

        fn try_distance(&self, query: &[f32], vertex: VertexId) -> Result<Option<f32>> {
            Ok(self
                .0
                .get(vertex as usize)
                .map(|v| Distance::L2.compute(query, v)))
        }

        fn distance_between(&self, a: VertexId, b: VertexId) -> Result<f32> {
            Ok(Distance::L2.compute(&self.0[a as usize], &self.0[b as usize]))
        }
    }

    fn candidates_for(points: &Points, query: &[f32], ids: &[VertexId]) -> BinaryHeap<Candidate> {
        ids.iter()
            .map(|&vertex| Candidate {
                dist: OrderedFloat(points.try_distance(query, vertex).unwrap().unwrap()),
                vertex,
            })
            .collect()
    }

    #[test]
    fn test_small_queue_unchanged() {
        let points = Points(vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        let mut queue = candidates_for(&points, &[0.0, 0.0], &[0, 1]);
        select_neighbors(&points, &mut queue, 5).unwrap();
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_clustered_candidate_rejected() {
        // 0 and 1 are a tight pair on the x axis; 2 sits on the y axis.
        // With m=2 the second member of the pair is rejected in favor of
        // the orthogonal point.
        let points = Points(vec![
            vec![1.0, 0.0],
            vec![1.1, 0.0],
            vec![0.0, 1.2],
        ]);
        let mut queue = candidates_for(&points, &[0.0, 0.0], &[0, 1, 2]);
        select_neighbors(&points, &mut queue, 2).unwrap();

        let mut ids: Vec<VertexId> = queue.into_iter().map(|c| c.vertex).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 2]);
    }

    #[test]
    fn test_bound_respected() {
        let points = Points(vec![
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![-1.0, 0.0],
            vec![0.0, -1.0],
        ]);
        let mut queue = candidates_for(&points, &[0.0, 0.0], &[0, 1, 2, 3]);
        select_neighbors(&points, &mut queue, 3).unwrap();
        assert!(queue.len() <= 3);
    }
}
