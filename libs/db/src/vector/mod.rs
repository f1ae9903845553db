//! Vector module - persistent graph-backed HNSW index.
//!
//! Items are vertices of the property graph; HNSW layer adjacency is
//! materialized as typed directed edges, one edge type per layer, named
//! `edge_type || decimal(layer)`. The index itself is serialized as a
//! compact parameter descriptor - the graph lives in the storage engine.
//!
//! ## Module Structure
//!
//! - `mod.rs` - `Index`, `IndexBuilder`, and the public API
//! - `adapter.rs` - facade over the graph layer (C2)
//! - `level.rs` - deterministic id-seeded layer assignment
//! - `search.rs` - greedy descent and base-layer best-first search
//! - `heuristic.rs` - neighbor diversification ("Heuristic 2")
//! - `insert.rs` - insertion engine and concurrency protocol
//! - `locks.rs` - global/vertex/excluded-set lock primitives
//! - `ram.rs` - in-memory HNSW used as a bulk-import origin
//! - `bulk.rs` - transactional bulk importer
//! - `descriptor.rs` - JSON parameter descriptor
//! - `distance.rs` - distance metrics and their registry
//! - `error.rs` - error helpers

mod adapter;
mod bulk;
pub mod descriptor;
pub mod distance;
mod error;
mod heuristic;
mod insert;
mod level;
mod locks;
pub mod ram;
mod search;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Result;

use crate::graph::{schema::Meta, Graph, IndexCode, VertexId};
use crate::rocksdb::{ColumnFamily, Storage, Store};

use adapter::{GraphAdapter, StoredLayers};
use locks::{ExcludedSet, VertexLocks};

pub use descriptor::{Comparator, IndexDescriptor};
pub use distance::Distance;
pub use ram::{RamHit, RamIndex, RamNode};

/// A materialized vertex as returned by lookups and searches.
#[derive(Debug, Clone)]
pub struct Vertex {
    pub id: VertexId,
    pub external_id: String,
    pub vector: Vec<f32>,
    pub max_level: u8,
}

/// One k-NN result: the vertex and its distance to the query.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub vertex: Vertex,
    pub distance: f32,
}

// ============================================================================
// IndexBuilder
// ============================================================================

/// Builder for a new persistent index, optionally seeded from an in-memory
/// origin.
///
/// ```ignore
/// let index = Index::builder(128, Distance::Cosine, 1_000_000)
///     .with_vertex_type("Document")
///     .with_edge_type("Proximity")
///     .with_m(16)
///     .build(&storage)?;
/// ```
pub struct IndexBuilder<'o> {
    dimensions: u32,
    distance: Distance,
    max_item_count: usize,
    m: usize,
    ef: usize,
    ef_construction: usize,
    vertex_type: String,
    edge_type: String,
    id_property_name: String,
    vector_property_name: String,
    cached: bool,
    transaction_batch_size: usize,
    origin: Option<&'o RamIndex>,
}

impl<'o> IndexBuilder<'o> {
    fn new(dimensions: u32, distance: Distance, max_item_count: usize) -> Self {
        Self {
            dimensions,
            distance,
            max_item_count,
            m: ram::DEFAULT_M,
            ef: ram::DEFAULT_EF,
            ef_construction: ram::DEFAULT_EF_CONSTRUCTION,
            vertex_type: "VectorItem".to_string(),
            edge_type: "Proximity".to_string(),
            id_property_name: "id".to_string(),
            vector_property_name: "vector".to_string(),
            cached: false,
            transaction_batch_size: 10_000,
            origin: None,
        }
    }

    /// Number of bi-directional links created for every new element.
    pub fn with_m(mut self, m: usize) -> Self {
        self.m = m;
        self
    }

    /// Size of the dynamic candidate list at query time.
    pub fn with_ef(mut self, ef: usize) -> Self {
        self.ef = ef;
        self
    }

    /// Construction-time beam width; clamped up to at least `m`.
    pub fn with_ef_construction(mut self, ef_construction: usize) -> Self {
        self.ef_construction = ef_construction;
        self
    }

    /// Vertex type holding the indexed items; also the registry key of the
    /// persisted descriptor.
    pub fn with_vertex_type(mut self, vertex_type: &str) -> Self {
        self.vertex_type = vertex_type.to_string();
        self
    }

    /// Edge-type prefix; layer `l` edges live under `edge_type || l`.
    pub fn with_edge_type(mut self, edge_type: &str) -> Self {
        self.edge_type = edge_type.to_string();
        self
    }

    /// Property name under which external clients read the id.
    pub fn with_id_property_name(mut self, name: &str) -> Self {
        self.id_property_name = name.to_string();
        self
    }

    /// Property name under which external clients read the vector.
    pub fn with_vector_property_name(mut self, name: &str) -> Self {
        self.vector_property_name = name.to_string();
        self
    }

    /// Keep loaded vertices in an in-memory cache.
    pub fn with_cache(mut self, cached: bool) -> Self {
        self.cached = cached;
        self
    }

    /// Items per transaction during bulk import.
    pub fn with_transaction_batch_size(mut self, transaction_batch_size: usize) -> Self {
        self.transaction_batch_size = transaction_batch_size;
        self
    }

    /// Create the index, persist its descriptor, and run the bulk import
    /// when an origin was given.
    pub fn build(self, storage: &Storage) -> Result<Index> {
        if self.dimensions == 0 {
            return Err(anyhow::anyhow!("dimensions must be positive"));
        }
        if self.m < 2 {
            return Err(anyhow::anyhow!("m must be at least 2"));
        }

        let txn_db = storage.transaction_db()?;

        let descriptor = IndexDescriptor {
            dimensions: self.dimensions,
            max_item_count: self.max_item_count,
            m: self.m,
            max_m: self.m,
            max_m0: self.m * 2,
            level_lambda: 1.0 / (self.m as f64).ln(),
            ef: self.ef,
            ef_construction: self.ef_construction.max(self.m),
            distance: self.distance,
            comparator: Comparator::NaturalOrder,
            entry_point: None,
            vertex_type: self.vertex_type.clone(),
            edge_type: self.edge_type.clone(),
            id_property_name: self.id_property_name.clone(),
            vector_property_name: self.vector_property_name.clone(),
        };

        let txn = txn_db.transaction();
        let code = {
            let store = Store::txn(txn_db, &txn);
            let descriptor_key = Meta::descriptor_key(&self.vertex_type);
            if store.get(Meta::CF_NAME, &descriptor_key)?.is_some() {
                return Err(error::index_exists(&self.vertex_type));
            }

            let next_key = Meta::next_code_key();
            let code = match store.get_for_update(Meta::CF_NAME, &next_key)? {
                Some(bytes) if bytes.len() == 8 => IndexCode::from_be_bytes(bytes[..].try_into()?),
                _ => 0,
            };
            store.put(Meta::CF_NAME, &next_key, &(code + 1).to_be_bytes())?;
            store.put(
                Meta::CF_NAME,
                &Meta::code_key(&self.vertex_type),
                &code.to_be_bytes(),
            )?;
            store.put(Meta::CF_NAME, &descriptor_key, &descriptor.to_bytes()?)?;
            code
        };
        txn.commit()?;

        let graph = {
            let store = Store::db(txn_db);
            Graph::attach(code, &store)?
        };

        let index = Index::from_parts(descriptor, graph, self.cached, self.transaction_batch_size);

        if let Some(origin) = self.origin {
            bulk::import(&index, storage, origin)?;
        }

        Ok(index)
    }
}

// ============================================================================
// Index
// ============================================================================

/// Persistent graph-backed HNSW index.
///
/// All operations take the `Storage` handle; the index itself holds only
/// parameters, the entry point, and the concurrency state, and is safe to
/// share across threads.
pub struct Index {
    pub(crate) dimensions: u32,
    pub(crate) max_item_count: usize,
    pub(crate) m: usize,
    pub(crate) max_m: usize,
    pub(crate) max_m0: usize,
    pub(crate) level_lambda: f64,
    ef: AtomicUsize,
    pub(crate) ef_construction: usize,
    distance: Distance,
    comparator: Comparator,
    vertex_type: String,
    edge_type: String,
    id_property_name: String,
    vector_property_name: String,
    pub(crate) transaction_batch_size: usize,
    /// Entry point encoded as `vertex + 1`, 0 for absent. Written only
    /// under the global lock; read lock-free.
    entry_point: AtomicU64,
    pub(crate) adapter: GraphAdapter,
    pub(crate) global: Mutex<()>,
    pub(crate) vertex_locks: VertexLocks,
    pub(crate) excluded: ExcludedSet,
}

impl Index {
    /// Start building a new index.
    pub fn builder(
        dimensions: u32,
        distance: Distance,
        max_item_count: usize,
    ) -> IndexBuilder<'static> {
        IndexBuilder::new(dimensions, distance, max_item_count)
    }

    /// Start building a new index seeded from an in-memory origin; the
    /// construction parameters are copied from the origin.
    pub fn builder_from(origin: &RamIndex) -> IndexBuilder<'_> {
        let mut builder = IndexBuilder::new(
            origin.dimensions(),
            origin.distance(),
            origin.max_item_count(),
        );
        builder.m = origin.m();
        builder.ef = origin.ef();
        builder.ef_construction = origin.ef_construction();
        builder.origin = Some(origin);
        builder
    }

    /// Open an existing index by vertex type.
    ///
    /// The descriptor is rehydrated from the meta column family; unknown
    /// distance functions or comparators fail the open.
    pub fn open(storage: &Storage, vertex_type: &str) -> Result<Index> {
        let txn_db = storage.transaction_db()?;
        let store = Store::db(txn_db);

        let descriptor_bytes = store
            .get(Meta::CF_NAME, &Meta::descriptor_key(vertex_type))?
            .ok_or_else(|| error::unknown_index(vertex_type))?;
        let descriptor = IndexDescriptor::from_bytes(&descriptor_bytes)?;

        let code_bytes = store
            .get(Meta::CF_NAME, &Meta::code_key(vertex_type))?
            .ok_or_else(|| error::unknown_index(vertex_type))?;
        if code_bytes.len() != 8 {
            return Err(anyhow::anyhow!("Corrupt index code for '{}'", vertex_type));
        }
        let code = IndexCode::from_be_bytes(code_bytes[..].try_into()?);

        let graph = Graph::attach(code, &store)?;
        Ok(Index::from_parts(descriptor, graph, false, 10_000))
    }

    fn from_parts(
        descriptor: IndexDescriptor,
        graph: Graph,
        cached: bool,
        transaction_batch_size: usize,
    ) -> Index {
        let adapter = GraphAdapter::new(
            graph,
            descriptor.edge_type.clone(),
            descriptor.distance,
            cached,
        );
        let index = Index {
            dimensions: descriptor.dimensions,
            max_item_count: descriptor.max_item_count,
            m: descriptor.m,
            max_m: descriptor.max_m,
            max_m0: descriptor.max_m0,
            level_lambda: descriptor.level_lambda,
            ef: AtomicUsize::new(descriptor.ef),
            ef_construction: descriptor.ef_construction,
            distance: descriptor.distance,
            comparator: descriptor.comparator,
            vertex_type: descriptor.vertex_type,
            edge_type: descriptor.edge_type,
            id_property_name: descriptor.id_property_name,
            vector_property_name: descriptor.vector_property_name,
            transaction_batch_size,
            entry_point: AtomicU64::new(0),
            adapter,
            global: Mutex::new(()),
            vertex_locks: VertexLocks::new(),
            excluded: ExcludedSet::new(),
        };
        index.store_entry_point(descriptor.entry_point);
        index
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Create a vertex for an external id and vector.
    ///
    /// The unique secondary index rejects duplicate ids; the vertex is not
    /// created in that case. The vertex is not registered with the HNSW
    /// graph until `add` is called.
    pub fn create_vertex(
        &self,
        storage: &Storage,
        external_id: &str,
        vector: &[f32],
    ) -> Result<VertexId> {
        error::check_dimension(self.dimensions, vector)?;
        let txn_db = storage.transaction_db()?;
        let txn = txn_db.transaction();
        let vertex = {
            let store = Store::txn(txn_db, &txn);
            self.adapter
                .graph()
                .create_vertex(&store, external_id, vector, 0)?
        };
        txn.commit()?;
        Ok(vertex)
    }

    /// Register a vertex with the HNSW graph.
    ///
    /// Returns `Ok(true)` on success; a vertex that already has layer-0
    /// out-edges is treated as already inserted and returns `Ok(true)`
    /// without mutation.
    pub fn add(&self, storage: &Storage, vertex: VertexId) -> Result<bool> {
        insert::add(self, storage, vertex)
    }

    /// Create and register in one call.
    pub fn insert(&self, storage: &Storage, external_id: &str, vector: &[f32]) -> Result<bool> {
        let vertex = self.create_vertex(storage, external_id, vector)?;
        self.add(storage, vertex)
    }

    /// Look up a vertex by external id.
    pub fn get(&self, storage: &Storage, external_id: &str) -> Result<Option<Vertex>> {
        let _global = self.global.lock().expect("poisoned global lock");
        let txn_db = storage.transaction_db()?;
        let store = Store::db(txn_db);

        let Some(vertex) = self
            .adapter
            .graph()
            .vertex_by_external_id(&store, external_id)?
        else {
            return Ok(None);
        };
        let Some(data) = self.adapter.load(&store, vertex)? else {
            return Ok(None);
        };
        Ok(Some(Vertex {
            id: vertex,
            external_id: data.external_id.clone(),
            vector: data.vector.clone(),
            max_level: data.max_level,
        }))
    }

    /// Remove a vertex by external id.
    ///
    /// Removing the entry point reassigns it to the highest-level remaining
    /// out-neighbor of the removed vertex, else to the highest-level vertex
    /// in the graph, else clears it. Returns `Ok(false)` for unknown ids.
    pub fn remove(&self, storage: &Storage, external_id: &str) -> Result<bool> {
        let _global = self.global.lock().expect("poisoned global lock");
        let txn_db = storage.transaction_db()?;
        let txn = txn_db.transaction();

        let mut reassigned: Option<Option<VertexId>> = None;
        {
            let store = Store::txn(txn_db, &txn);
            let Some(vertex) = self
                .adapter
                .graph()
                .vertex_by_external_id(&store, external_id)?
            else {
                return Ok(false);
            };

            if self.entry_point() == Some(vertex) {
                let replacement = self.pick_replacement_entry(&store, vertex)?;
                self.persist_entry_point(&store, replacement)?;
                reassigned = Some(replacement);
            }

            self.adapter.delete_vertex(&store, vertex)?;
        }
        txn.commit()?;

        if let Some(replacement) = reassigned {
            self.store_entry_point(replacement);
        }
        Ok(true)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// k-NN search for a query vector, ascending by distance.
    pub fn find_nearest(
        &self,
        storage: &Storage,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        error::check_dimension(self.dimensions, query)?;
        let Some(entry) = self.entry_point() else {
            return Ok(Vec::new());
        };

        let txn_db = storage.transaction_db()?;
        let store = Store::db(txn_db);
        let view = StoredLayers {
            adapter: &self.adapter,
            store: &store,
            locks: None,
        };

        let entry_level = self.adapter.max_level(&store, entry)?;
        let hits = search::find_nearest_in(&view, entry, entry_level, query, k, self.ef())?;

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let Some(data) = self.adapter.load(&store, hit.vertex)? else {
                continue;
            };
            results.push(SearchResult {
                vertex: Vertex {
                    id: hit.vertex,
                    external_id: data.external_id.clone(),
                    vector: data.vector.clone(),
                    max_level: data.max_level,
                },
                distance: hit.dist.into_inner(),
            });
        }
        Ok(results)
    }

    /// k-NN search around a stored vertex, excluding the vertex itself.
    ///
    /// Unknown ids return an empty result.
    pub fn find_neighbors(
        &self,
        storage: &Storage,
        external_id: &str,
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        let Some(start) = self.get(storage, external_id)? else {
            return Ok(Vec::new());
        };

        let results = self.find_nearest(storage, &start.vector, k + 1)?;
        Ok(results
            .into_iter()
            .filter(|r| r.vertex.external_id != external_id)
            .take(k)
            .collect())
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Out-degree of a vertex at a layer.
    pub fn out_degree(&self, storage: &Storage, vertex: VertexId, layer: u8) -> Result<u64> {
        let txn_db = storage.transaction_db()?;
        let store = Store::db(txn_db);
        self.adapter.degree(&store, vertex, layer)
    }

    /// Out-neighbors of a vertex at a layer.
    pub fn neighbors_of(
        &self,
        storage: &Storage,
        vertex: VertexId,
        layer: u8,
    ) -> Result<Vec<VertexId>> {
        let txn_db = storage.transaction_db()?;
        let store = Store::db(txn_db);
        Ok(self.adapter.neighbors(&store, vertex, layer)?.iter().collect())
    }

    /// All vertices of the index, in id order.
    pub fn vertices(&self, storage: &Storage) -> Result<Vec<Vertex>> {
        let txn_db = storage.transaction_db()?;
        let store = Store::db(txn_db);

        let mut out = Vec::new();
        for (vertex, record) in self.adapter.graph().scan_vertices(&store)? {
            let Some(vector) = self.adapter.graph().vector(&store, vertex)? else {
                continue;
            };
            out.push(Vertex {
                id: vertex,
                external_id: record.external_id,
                vector,
                max_level: record.max_level,
            });
        }
        Ok(out)
    }

    /// Current descriptor snapshot, including the live entry point.
    pub fn descriptor(&self) -> IndexDescriptor {
        self.descriptor_snapshot(self.entry_point())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn dimensions(&self) -> u32 {
        self.dimensions
    }

    pub fn m(&self) -> usize {
        self.m
    }

    pub fn ef(&self) -> usize {
        self.ef.load(Ordering::Relaxed)
    }

    /// Set the query-time beam width.
    pub fn set_ef(&self, ef: usize) {
        self.ef.store(ef, Ordering::Relaxed);
    }

    pub fn ef_construction(&self) -> usize {
        self.ef_construction
    }

    pub fn max_item_count(&self) -> usize {
        self.max_item_count
    }

    pub fn distance(&self) -> Distance {
        self.distance
    }

    pub fn comparator(&self) -> Comparator {
        self.comparator
    }

    pub fn vertex_type(&self) -> &str {
        &self.vertex_type
    }

    pub fn edge_type(&self) -> &str {
        &self.edge_type
    }

    pub fn id_property_name(&self) -> &str {
        &self.id_property_name
    }

    pub fn vector_property_name(&self) -> &str {
        &self.vector_property_name
    }

    /// The current entry point, if any. May be transiently stale relative
    /// to a concurrent insert; the old entry point stays reachable.
    pub fn entry_point(&self) -> Option<VertexId> {
        match self.entry_point.load(Ordering::Acquire) {
            0 => None,
            packed => Some((packed - 1) as VertexId),
        }
    }

    // =========================================================================
    // Internal
    // =========================================================================

    pub(crate) fn store_entry_point(&self, entry: Option<VertexId>) {
        let packed = entry.map_or(0, |v| u64::from(v) + 1);
        self.entry_point.store(packed, Ordering::Release);
    }

    fn descriptor_snapshot(&self, entry: Option<VertexId>) -> IndexDescriptor {
        IndexDescriptor {
            dimensions: self.dimensions,
            max_item_count: self.max_item_count,
            m: self.m,
            max_m: self.max_m,
            max_m0: self.max_m0,
            level_lambda: self.level_lambda,
            ef: self.ef(),
            ef_construction: self.ef_construction,
            distance: self.distance,
            comparator: self.comparator,
            entry_point: entry,
            vertex_type: self.vertex_type.clone(),
            edge_type: self.edge_type.clone(),
            id_property_name: self.id_property_name.clone(),
            vector_property_name: self.vector_property_name.clone(),
        }
    }

    /// Persist the descriptor with `entry` as the entry point, inside the
    /// caller's transaction.
    pub(crate) fn persist_entry_point(
        &self,
        store: &Store<'_>,
        entry: Option<VertexId>,
    ) -> Result<()> {
        let bytes = self.descriptor_snapshot(entry).to_bytes()?;
        store.put(
            Meta::CF_NAME,
            &Meta::descriptor_key(&self.vertex_type),
            &bytes,
        )
    }

    /// Entry-point replacement policy on removal: the highest-level
    /// out-neighbor found on the topmost non-empty layer of the removed
    /// vertex, else the highest-level vertex in the graph.
    fn pick_replacement_entry(
        &self,
        store: &Store<'_>,
        removed: VertexId,
    ) -> Result<Option<VertexId>> {
        let removed_level = self.adapter.max_level(store, removed)?;

        for layer in (0..=removed_level).rev() {
            let mut best: Option<(u8, VertexId)> = None;
            for neighbor in self.adapter.neighbors(store, removed, layer)?.iter() {
                if neighbor == removed {
                    continue;
                }
                let Some(data) = self.adapter.load(store, neighbor)? else {
                    continue;
                };
                let better = match best {
                    Some((level, _)) => data.max_level > level,
                    None => true,
                };
                if better {
                    best = Some((data.max_level, neighbor));
                }
            }
            if let Some((_, vertex)) = best {
                return Ok(Some(vertex));
            }
        }

        let mut best: Option<(u8, VertexId)> = None;
        for (vertex, record) in self.adapter.graph().scan_vertices(store)? {
            if vertex == removed {
                continue;
            }
            let better = match best {
                Some((level, _)) => record.max_level > level,
                None => true,
            };
            if better {
                best = Some((record.max_level, vertex));
            }
        }
        Ok(best.map(|(_, vertex)| vertex))
    }
}
