//! Graph adapter: the facade the HNSW algorithms use to reach the
//! property-graph layer.
//!
//! Responsibilities:
//! - vertex loads, optionally short-circuited by an in-memory cache;
//! - layer <-> edge-type resolution (`edge_type || decimal(layer)`);
//! - adjacency reads and degree counts per layer;
//! - edge wiring and whole-neighborhood replacement.

use std::sync::Arc;

use anyhow::Result;
use dashmap::DashMap;
use roaring::RoaringBitmap;

use crate::graph::{EdgeTypeId, Graph, VertexId};
use crate::rocksdb::Store;

use super::distance::Distance;
use super::locks::VertexLocks;
use super::search::LayerGraph;

/// Vertex payload as the index sees it.
#[derive(Debug, Clone)]
pub(crate) struct VertexData {
    pub external_id: String,
    pub max_level: u8,
    pub vector: Vec<f32>,
}

/// Facade over the graph layer for one index.
pub(crate) struct GraphAdapter {
    graph: Graph,
    edge_type_prefix: String,
    distance: Distance,
    layer_types: DashMap<u8, EdgeTypeId>,
    cache: Option<DashMap<VertexId, Arc<VertexData>>>,
}

impl GraphAdapter {
    pub fn new(graph: Graph, edge_type_prefix: String, distance: Distance, cached: bool) -> Self {
        Self {
            graph,
            edge_type_prefix,
            distance,
            layer_types: DashMap::new(),
            cache: cached.then(DashMap::new),
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn distance(&self) -> Distance {
        self.distance
    }

    /// Persisted edge-type name of a layer.
    pub fn edge_type_name(&self, layer: u8) -> String {
        format!("{}{}", self.edge_type_prefix, layer)
    }

    /// Resolve a layer's edge type if it has been created.
    fn resolve_layer(&self, store: &Store<'_>, layer: u8) -> Result<Option<EdgeTypeId>> {
        if let Some(id) = self.layer_types.get(&layer) {
            return Ok(Some(*id));
        }
        match self.graph.edge_type(store, &self.edge_type_name(layer))? {
            Some(id) => {
                self.layer_types.insert(layer, id);
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    /// Resolve a layer's edge type, creating it in the schema when absent.
    pub fn ensure_layer(&self, store: &Store<'_>, layer: u8) -> Result<EdgeTypeId> {
        if let Some(id) = self.layer_types.get(&layer) {
            return Ok(*id);
        }
        self.graph
            .get_or_create_edge_type(store, &self.edge_type_name(layer))
    }

    // =========================================================================
    // Vertex loads
    // =========================================================================

    /// Load a vertex, if it still resolves.
    pub fn load(&self, store: &Store<'_>, vertex: VertexId) -> Result<Option<Arc<VertexData>>> {
        if let Some(cache) = &self.cache {
            if let Some(data) = cache.get(&vertex) {
                return Ok(Some(Arc::clone(&data)));
            }
        }

        let Some(record) = self.graph.record(store, vertex)? else {
            return Ok(None);
        };
        let Some(vector) = self.graph.vector(store, vertex)? else {
            return Ok(None);
        };

        let data = Arc::new(VertexData {
            external_id: record.external_id,
            max_level: record.max_level,
            vector,
        });
        if let Some(cache) = &self.cache {
            cache.insert(vertex, Arc::clone(&data));
        }
        Ok(Some(data))
    }

    /// Load a vertex that must exist.
    pub fn require(&self, store: &Store<'_>, vertex: VertexId) -> Result<Arc<VertexData>> {
        self.load(store, vertex)?
            .ok_or_else(|| anyhow::anyhow!("Vertex {} not found", vertex))
    }

    /// A vertex's maximum layer; a missing vertex reads as 0.
    pub fn max_level(&self, store: &Store<'_>, vertex: VertexId) -> Result<u8> {
        Ok(self.load(store, vertex)?.map_or(0, |d| d.max_level))
    }

    /// Persist a vertex's maximum layer and invalidate its cache entry.
    pub fn set_max_level(&self, store: &Store<'_>, vertex: VertexId, level: u8) -> Result<()> {
        self.graph.set_max_level(store, vertex, level)?;
        if let Some(cache) = &self.cache {
            cache.remove(&vertex);
        }
        Ok(())
    }

    /// Delete a vertex and drop it from the cache.
    pub fn delete_vertex(&self, store: &Store<'_>, vertex: VertexId) -> Result<()> {
        self.graph.delete_vertex(store, vertex)?;
        if let Some(cache) = &self.cache {
            cache.remove(&vertex);
        }
        Ok(())
    }

    // =========================================================================
    // Adjacency
    // =========================================================================

    /// Out-neighbors of `vertex` at `layer`; empty when the layer's edge
    /// type does not exist yet.
    pub fn neighbors(&self, store: &Store<'_>, vertex: VertexId, layer: u8) -> Result<RoaringBitmap> {
        match self.resolve_layer(store, layer)? {
            Some(edge_type) => self.graph.neighbors(store, vertex, edge_type),
            None => Ok(RoaringBitmap::new()),
        }
    }

    /// Out-neighbors with the row lock held until commit (see
    /// `Graph::neighbors_for_update`). Creates the layer's edge type.
    pub fn neighbors_for_update(
        &self,
        store: &Store<'_>,
        vertex: VertexId,
        layer: u8,
    ) -> Result<RoaringBitmap> {
        let edge_type = self.ensure_layer(store, layer)?;
        self.graph.neighbors_for_update(store, vertex, edge_type)
    }

    /// Out-degree of `vertex` at `layer`.
    pub fn degree(&self, store: &Store<'_>, vertex: VertexId, layer: u8) -> Result<u64> {
        Ok(self.neighbors(store, vertex, layer)?.len())
    }

    /// Create the directed edge `from -> to` at `layer`, creating the
    /// layer's edge type when absent.
    pub fn add_edge(
        &self,
        store: &Store<'_>,
        from: VertexId,
        to: VertexId,
        layer: u8,
    ) -> Result<()> {
        let edge_type = self.ensure_layer(store, layer)?;
        self.graph.add_edge(store, from, to, edge_type)
    }

    /// Replace the whole out-adjacency of `vertex` at `layer`.
    pub fn replace_neighbors(
        &self,
        store: &Store<'_>,
        vertex: VertexId,
        layer: u8,
        neighbors: &RoaringBitmap,
    ) -> Result<()> {
        let edge_type = self.ensure_layer(store, layer)?;
        self.graph.replace_edges(store, vertex, edge_type, neighbors)
    }

}

/// `LayerGraph` view over the persistent graph.
///
/// With `locks` set (insert descent), each out-neighbor scan runs under the
/// scanned vertex's mutation lock to observe a consistent snapshot.
pub(crate) struct StoredLayers<'a> {
    pub adapter: &'a GraphAdapter,
    pub store: &'a Store<'a>,
    pub locks: Option<&'a VertexLocks>,
}

impl LayerGraph for StoredLayers<'_> {
    fn neighbors(&self, vertex: VertexId, layer: u8) -> Result<Vec<VertexId>> {
        let bitmap = match self.locks {
            Some(locks) => {
                let _guard = locks.lock(vertex);
                self.adapter.neighbors(self.store, vertex, layer)?
            }
            None => self.adapter.neighbors(self.store, vertex, layer)?,
        };
        Ok(bitmap.iter().collect())
    }

    fn try_distance(&self, query: &[f32], vertex: VertexId) -> Result<Option<f32>> {
        Ok(self
            .adapter
            .load(self.store, vertex)?
            .map(|data| self.adapter.distance().compute(query, &data.vector)))
    }

    fn distance_between(&self, a: VertexId, b: VertexId) -> Result<f32> {
        let first = self.adapter.require(self.store, a)?;
        let second = self.adapter.require(self.store, b)?;
        Ok(self
            .adapter
            .distance()
            .compute(&first.vector, &second.vector))
    }
}
