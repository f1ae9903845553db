//! In-memory HNSW index.
//!
//! A complete, single-threaded HNSW over in-memory adjacency lists. Its
//! main role is as the *origin* of a bulk import: build here at memory
//! speed, then stream the finished graph into the persistent index in
//! transactional batches. It shares the level assigner, the search
//! algorithms, and the neighbor heuristic with the persistent index, so an
//! imported graph answers queries identically to its origin.
//!
//! Per-node adjacency is a fixed-length sequence of neighbor lists indexed
//! by layer, sized at insert time to the node's assigned level plus one.

use std::collections::BinaryHeap;
use std::collections::HashMap;

use anyhow::Result;
use ordered_float::OrderedFloat;

use crate::graph::VertexId;

use super::distance::Distance;
use super::error;
use super::heuristic::select_neighbors;
use super::level::assign_level;
use super::search::{find_nearest_in, greedy_descent, search_base_layer, Candidate, LayerGraph};

pub(crate) const DEFAULT_M: usize = 10;
pub(crate) const DEFAULT_EF: usize = 10;
pub(crate) const DEFAULT_EF_CONSTRUCTION: usize = 200;

struct RamNodeData {
    external_id: String,
    vector: Vec<f32>,
    max_level: u8,
    connections: Vec<Vec<u32>>,
}

/// A node exposed by `RamIndex::iter_nodes`, as consumed by the bulk
/// importer: internal id, payload, and per-layer neighbor lists of internal
/// ids.
pub struct RamNode<'a> {
    pub id: u32,
    pub external_id: &'a str,
    pub vector: &'a [f32],
    pub max_level: u8,
    pub connections: &'a [Vec<u32>],
}

/// A search hit from the in-memory index.
#[derive(Debug, Clone, PartialEq)]
pub struct RamHit {
    pub node: u32,
    pub distance: f32,
}

/// In-memory HNSW index.
pub struct RamIndex {
    dimensions: u32,
    distance: Distance,
    max_item_count: usize,
    m: usize,
    max_m: usize,
    max_m0: usize,
    level_lambda: f64,
    ef: usize,
    ef_construction: usize,
    nodes: Vec<RamNodeData>,
    by_external_id: HashMap<String, u32>,
    entry_point: Option<u32>,
}

impl RamIndex {
    /// Create an empty in-memory index with default construction parameters.
    pub fn new(dimensions: u32, distance: Distance, max_item_count: usize) -> Self {
        let m = DEFAULT_M;
        Self {
            dimensions,
            distance,
            max_item_count,
            m,
            max_m: m,
            max_m0: m * 2,
            level_lambda: 1.0 / (m as f64).ln(),
            ef: DEFAULT_EF,
            ef_construction: DEFAULT_EF_CONSTRUCTION.max(m),
            nodes: Vec::new(),
            by_external_id: HashMap::new(),
            entry_point: None,
        }
    }

    /// Set the target out-degree `m` (also adjusts `max_m`, `max_m0`, and
    /// the level lambda). Call before the first insert.
    pub fn with_m(mut self, m: usize) -> Self {
        self.m = m;
        self.max_m = m;
        self.max_m0 = m * 2;
        self.level_lambda = 1.0 / (m as f64).ln();
        self.ef_construction = self.ef_construction.max(m);
        self
    }

    /// Set the query-time beam width.
    pub fn with_ef(mut self, ef: usize) -> Self {
        self.ef = ef;
        self
    }

    /// Set the construction-time beam width.
    pub fn with_ef_construction(mut self, ef_construction: usize) -> Self {
        self.ef_construction = ef_construction.max(self.m);
        self
    }

    pub fn dimensions(&self) -> u32 {
        self.dimensions
    }

    pub fn distance(&self) -> Distance {
        self.distance
    }

    pub fn max_item_count(&self) -> usize {
        self.max_item_count
    }

    pub fn m(&self) -> usize {
        self.m
    }

    pub fn ef(&self) -> usize {
        self.ef
    }

    pub fn ef_construction(&self) -> usize {
        self.ef_construction
    }

    /// Number of nodes in the index.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The origin's internal entry-point node id.
    pub fn entry_point(&self) -> Option<u32> {
        self.entry_point
    }

    /// External id of a node.
    pub fn external_id(&self, node: u32) -> &str {
        &self.nodes[node as usize].external_id
    }

    /// Iterate all nodes in insertion order.
    pub fn iter_nodes(&self) -> impl Iterator<Item = RamNode<'_>> {
        self.nodes.iter().enumerate().map(|(id, node)| RamNode {
            id: id as u32,
            external_id: &node.external_id,
            vector: &node.vector,
            max_level: node.max_level,
            connections: &node.connections,
        })
    }

    /// Insert a vector under an external id.
    ///
    /// Returns `Ok(true)` on success; re-inserting a known id is an
    /// idempotent success.
    pub fn insert(&mut self, external_id: &str, vector: &[f32]) -> Result<bool> {
        error::check_dimension(self.dimensions, vector)?;

        if self.by_external_id.contains_key(external_id) {
            return Ok(true);
        }

        let level = assign_level(external_id, self.level_lambda);
        let id = self.nodes.len() as u32;
        self.nodes.push(RamNodeData {
            external_id: external_id.to_string(),
            vector: vector.to_vec(),
            max_level: level,
            connections: vec![Vec::new(); level as usize + 1],
        });
        self.by_external_id.insert(external_id.to_string(), id);

        let Some(entry) = self.entry_point else {
            self.entry_point = Some(id);
            return Ok(true);
        };
        let entry_level = self.nodes[entry as usize].max_level;

        let mut current = entry;
        if level < entry_level {
            let query = self.nodes[id as usize].vector.clone();
            let mut current_dist = self
                .distance
                .compute(&query, &self.nodes[current as usize].vector);
            for layer in (level + 1..=entry_level).rev() {
                (current, current_dist) =
                    greedy_descent(&*self, &query, current, current_dist, layer)?;
            }
        }

        for layer in (0..=level.min(entry_level)).rev() {
            let query = self.nodes[id as usize].vector.clone();
            let mut top =
                search_base_layer(&*self, &query, current, self.ef_construction, layer)?;
            self.connect(id, &query, &mut top, layer)?;
        }

        if level > entry_level {
            self.entry_point = Some(id);
        }

        Ok(true)
    }

    /// k-NN search, ascending by distance.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<RamHit>> {
        error::check_dimension(self.dimensions, query)?;
        let Some(entry) = self.entry_point else {
            return Ok(Vec::new());
        };
        let entry_level = self.nodes[entry as usize].max_level;
        let hits = find_nearest_in(self, entry, entry_level, query, k, self.ef.max(k))?;
        Ok(hits
            .into_iter()
            .map(|c| RamHit {
                node: c.vertex,
                distance: c.dist.into_inner(),
            })
            .collect())
    }

    fn connect(
        &mut self,
        node: u32,
        query: &[f32],
        top: &mut BinaryHeap<Candidate>,
        layer: u8,
    ) -> Result<()> {
        let best_n = if layer == 0 { self.max_m0 } else { self.max_m };

        select_neighbors(&*self, top, self.m)?;

        while let Some(selected) = top.pop() {
            let neighbor = selected.vertex;

            self.nodes[node as usize].connections[layer as usize].push(neighbor);

            let degree = self.nodes[neighbor as usize].connections[layer as usize].len();
            if degree < best_n {
                self.nodes[neighbor as usize].connections[layer as usize].push(node);
            } else {
                let survivors = {
                    let neighbor_vector = &self.nodes[neighbor as usize].vector;
                    let mut candidates: BinaryHeap<Candidate> = BinaryHeap::new();
                    candidates.push(Candidate {
                        dist: OrderedFloat(self.distance.compute(neighbor_vector, query)),
                        vertex: node,
                    });
                    for &other in &self.nodes[neighbor as usize].connections[layer as usize] {
                        candidates.push(Candidate {
                            dist: OrderedFloat(
                                self.distance
                                    .compute(neighbor_vector, &self.nodes[other as usize].vector),
                            ),
                            vertex: other,
                        });
                    }
                    select_neighbors(&*self, &mut candidates, best_n)?;
                    candidates.into_iter().map(|c| c.vertex).collect::<Vec<u32>>()
                };
                self.nodes[neighbor as usize].connections[layer as usize] = survivors;
            }
        }

        Ok(())
    }
}

impl LayerGraph for RamIndex {
    fn neighbors(&self, vertex: VertexId, layer: u8) -> Result<Vec<VertexId>> {
        let node = &self.nodes[vertex as usize];
        if layer > node.max_level {
            return Ok(Vec::new());
        }
        // Ascending id order, matching the persistent adjacency bitmaps, so
        // an imported graph traverses identically to its origin.
        let mut out = node.connections[layer as usize].clone();
        out.sort_unstable();
        out.dedup();
        Ok(out)
    }

    fn try_distance(&self, query: &[f32], vertex: VertexId) -> Result<Option<f32>> {
        Ok(self
            .nodes
            .get(vertex as usize)
            .map(|node| self.distance.compute(query, &node.vector)))
    }

    fn distance_between(&self, a: VertexId, b: VertexId) -> Result<f32> {
        Ok(self.distance.compute(
            &self.nodes[a as usize].vector,
            &self.nodes[b as usize].vector,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_index(side: usize) -> RamIndex {
        let mut index = RamIndex::new(2, Distance::L2, side * side)
            .with_m(4)
            .with_ef(16)
            .with_ef_construction(32);
        for x in 0..side {
            for y in 0..side {
                index
                    .insert(&format!("p-{}-{}", x, y), &[x as f32, y as f32])
                    .unwrap();
            }
        }
        index
    }

    #[test]
    fn test_empty_search() {
        let index = RamIndex::new(2, Distance::L2, 10);
        assert!(index.search(&[0.0, 0.0], 3).unwrap().is_empty());
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut index = RamIndex::new(3, Distance::L2, 10);
        assert!(index.insert("a", &[1.0]).is_err());
        index.insert("a", &[1.0, 2.0, 3.0]).unwrap();
        assert!(index.search(&[1.0], 1).is_err());
    }

    #[test]
    fn test_idempotent_insert() {
        let mut index = RamIndex::new(2, Distance::L2, 10);
        assert!(index.insert("a", &[0.0, 0.0]).unwrap());
        assert!(index.insert("a", &[9.0, 9.0]).unwrap());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_exact_neighbors_on_grid() {
        let index = grid_index(6);
        let hits = index.search(&[2.1, 3.1], 1).unwrap();
        assert_eq!(index.external_id(hits[0].node), "p-2-3");
    }

    #[test]
    fn test_results_ascend_by_distance() {
        let index = grid_index(5);
        let hits = index.search(&[1.5, 1.5], 8).unwrap();
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn test_degree_caps_hold() {
        let index = grid_index(8);
        for node in index.iter_nodes() {
            for (layer, connections) in node.connections.iter().enumerate() {
                let cap = if layer == 0 { index.max_m0 } else { index.max_m };
                assert!(
                    connections.len() <= cap,
                    "node {} layer {} degree {} exceeds {}",
                    node.id,
                    layer,
                    connections.len(),
                    cap
                );
            }
        }
    }

    #[test]
    fn test_entry_point_has_max_level() {
        let index = grid_index(8);
        let entry = index.entry_point().unwrap();
        let entry_level = index.iter_nodes().nth(entry as usize).unwrap().max_level;
        let max_level = index.iter_nodes().map(|n| n.max_level).max().unwrap();
        assert_eq!(entry_level, max_level);
    }
}
