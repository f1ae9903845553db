//! Property-graph layer over RocksDB.
//!
//! Vertices carry an external id, a vector payload, and a maximum layer;
//! directed edges are grouped by registered edge type and stored as one
//! adjacency bitmap per `(vertex, edge type)`. A unique secondary index maps
//! external ids to vertex identities.
//!
//! All mutating operations must run inside a transaction (`Store::txn`);
//! reads work against either committed state or an open transaction.

pub mod schema;

use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::{anyhow, Result};
use dashmap::DashMap;
use roaring::RoaringBitmap;

use crate::rocksdb::{ColumnFamily, ColumnFamilyRecord, Store};

pub use schema::{EdgeTypeId, IndexCode, VertexId, VertexRecord};

use schema::{EdgeCfKey, Edges, ExternalIds, Meta, VertexCfKey, Vectors, Vertices};
use schema::VectorCfKey;

/// Graph operations scoped to one index code.
///
/// Vertex ids are allocated from a monotonic in-memory counter that is
/// persisted alongside each create and re-derived from the last stored key
/// on attach. Freed ids are never reused, so a dangling reference can only
/// point at a missing vertex, never at a different one.
pub struct Graph {
    code: IndexCode,
    next_vertex: AtomicU32,
    edge_types: DashMap<String, EdgeTypeId>,
}

impl Graph {
    /// Attach to an index code, recovering the vertex id sequence.
    pub fn attach(code: IndexCode, store: &Store<'_>) -> Result<Self> {
        let mut next = match store.get(Meta::CF_NAME, &Meta::vertex_seq_key(code))? {
            Some(bytes) if bytes.len() == 4 => VertexId::from_be_bytes(bytes[..].try_into()?),
            _ => 0,
        };

        // The sequence row can lag behind concurrent creates; the last stored
        // vertex key is authoritative.
        if let Some(last_key) = store.last_in_prefix(Vertices::CF_NAME, &code.to_be_bytes())? {
            let key = <Vertices as ColumnFamilyRecord>::key_from_bytes(&last_key)?;
            next = next.max(key.1 + 1);
        }

        Ok(Self {
            code,
            next_vertex: AtomicU32::new(next),
            edge_types: DashMap::new(),
        })
    }

    /// The index code this graph is scoped to.
    pub fn code(&self) -> IndexCode {
        self.code
    }

    // =========================================================================
    // Vertices
    // =========================================================================

    /// Create a vertex with its external id, vector payload, and max level.
    ///
    /// Fails without creating anything when the external id is already
    /// present (unique index violation). Requires an open transaction; the
    /// id row is locked so concurrent creates of the same id serialize.
    pub fn create_vertex(
        &self,
        store: &Store<'_>,
        external_id: &str,
        vector: &[f32],
        max_level: u8,
    ) -> Result<VertexId> {
        let ext_key = ExternalIds::key_to_bytes(self.code, external_id);
        if store.get_for_update(ExternalIds::CF_NAME, &ext_key)?.is_some() {
            return Err(anyhow!(
                "Unique index violation: external id '{}' already exists",
                external_id
            ));
        }

        let vertex = self.next_vertex.fetch_add(1, Ordering::SeqCst);
        let record = VertexRecord {
            external_id: external_id.to_string(),
            max_level,
        };

        store.put(
            ExternalIds::CF_NAME,
            &ext_key,
            &ExternalIds::value_to_bytes(vertex),
        )?;
        store.put(
            Vertices::CF_NAME,
            &<Vertices as ColumnFamilyRecord>::key_to_bytes(&VertexCfKey(self.code, vertex)),
            &<Vertices as ColumnFamilyRecord>::value_to_bytes(&record)?,
        )?;
        store.put(
            Vectors::CF_NAME,
            &Vectors::key_to_bytes(&VectorCfKey(self.code, vertex)),
            &Vectors::value_to_bytes(vector),
        )?;
        store.put(
            Meta::CF_NAME,
            &Meta::vertex_seq_key(self.code),
            &(vertex + 1).to_be_bytes(),
        )?;

        Ok(vertex)
    }

    /// Resolve an external id through the unique secondary index.
    pub fn vertex_by_external_id(
        &self,
        store: &Store<'_>,
        external_id: &str,
    ) -> Result<Option<VertexId>> {
        let key = ExternalIds::key_to_bytes(self.code, external_id);
        match store.get(ExternalIds::CF_NAME, &key)? {
            Some(bytes) => Ok(Some(ExternalIds::value_from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Load a vertex record, if present.
    pub fn record(&self, store: &Store<'_>, vertex: VertexId) -> Result<Option<VertexRecord>> {
        let key = <Vertices as ColumnFamilyRecord>::key_to_bytes(&VertexCfKey(self.code, vertex));
        match store.get(Vertices::CF_NAME, &key)? {
            Some(bytes) => Ok(Some(<Vertices as ColumnFamilyRecord>::value_from_bytes(
                &bytes,
            )?)),
            None => Ok(None),
        }
    }

    /// Load a vertex's vector payload, if present.
    pub fn vector(&self, store: &Store<'_>, vertex: VertexId) -> Result<Option<Vec<f32>>> {
        let key = Vectors::key_to_bytes(&VectorCfKey(self.code, vertex));
        match store.get(Vectors::CF_NAME, &key)? {
            Some(bytes) => Ok(Some(Vectors::value_from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Overwrite a vertex's max level.
    pub fn set_max_level(&self, store: &Store<'_>, vertex: VertexId, max_level: u8) -> Result<()> {
        let key = <Vertices as ColumnFamilyRecord>::key_to_bytes(&VertexCfKey(self.code, vertex));
        let mut record = match store.get(Vertices::CF_NAME, &key)? {
            Some(bytes) => <Vertices as ColumnFamilyRecord>::value_from_bytes(&bytes)?,
            None => return Err(anyhow!("Vertex {} not found", vertex)),
        };
        record.max_level = max_level;
        store.put(
            Vertices::CF_NAME,
            &key,
            &<Vertices as ColumnFamilyRecord>::value_to_bytes(&record)?,
        )?;
        Ok(())
    }

    /// Delete a vertex: its record, vector, external id entry, out-adjacency
    /// rows, and its occurrences in the out-neighbors' adjacency at the same
    /// edge types. Asymmetric in-edges from non-neighbors may linger; they
    /// resolve to a missing vertex and are skipped by readers.
    pub fn delete_vertex(&self, store: &Store<'_>, vertex: VertexId) -> Result<()> {
        let Some(record) = self.record(store, vertex)? else {
            return Ok(());
        };

        let prefix = Edges::vertex_prefix(self.code, vertex);
        for (key, value) in store.prefix_scan(Edges::CF_NAME, &prefix)? {
            let EdgeCfKey(_, _, edge_type) = Edges::key_from_bytes(&key)?;
            let neighbors = RoaringBitmap::deserialize_from(&value[..])?;
            for neighbor in neighbors {
                let nkey = Edges::key_to_bytes(&EdgeCfKey(self.code, neighbor, edge_type));
                if let Some(nbytes) = store.get_for_update(Edges::CF_NAME, &nkey)? {
                    let mut nbitmap = RoaringBitmap::deserialize_from(&nbytes[..])?;
                    if nbitmap.remove(vertex) {
                        let mut buf = Vec::with_capacity(nbitmap.serialized_size());
                        nbitmap.serialize_into(&mut buf)?;
                        store.put(Edges::CF_NAME, &nkey, &buf)?;
                    }
                }
            }
            store.delete(Edges::CF_NAME, &key)?;
        }

        store.delete(
            Vertices::CF_NAME,
            &<Vertices as ColumnFamilyRecord>::key_to_bytes(&VertexCfKey(self.code, vertex)),
        )?;
        store.delete(
            Vectors::CF_NAME,
            &Vectors::key_to_bytes(&VectorCfKey(self.code, vertex)),
        )?;
        store.delete(
            ExternalIds::CF_NAME,
            &ExternalIds::key_to_bytes(self.code, &record.external_id),
        )?;
        Ok(())
    }

    /// All vertices of this index, in id order.
    pub fn scan_vertices(&self, store: &Store<'_>) -> Result<Vec<(VertexId, VertexRecord)>> {
        let rows = store.prefix_scan(Vertices::CF_NAME, &self.code.to_be_bytes())?;
        let mut out = Vec::with_capacity(rows.len());
        for (key, value) in rows {
            let key = <Vertices as ColumnFamilyRecord>::key_from_bytes(&key)?;
            let record = <Vertices as ColumnFamilyRecord>::value_from_bytes(&value)?;
            out.push((key.1, record));
        }
        Ok(out)
    }

    // =========================================================================
    // Edges
    // =========================================================================

    /// Out-neighbors of `vertex` under `edge_type`. Missing row reads as empty.
    pub fn neighbors(
        &self,
        store: &Store<'_>,
        vertex: VertexId,
        edge_type: EdgeTypeId,
    ) -> Result<RoaringBitmap> {
        let key = Edges::key_to_bytes(&EdgeCfKey(self.code, vertex, edge_type));
        match store.get(Edges::CF_NAME, &key)? {
            Some(bytes) => Ok(RoaringBitmap::deserialize_from(&bytes[..])?),
            None => Ok(RoaringBitmap::new()),
        }
    }

    /// Out-neighbors with an exclusive row lock held until commit.
    ///
    /// Use for read-modify-write cycles on adjacency; concurrent writers to
    /// the same row serialize on the lock.
    pub fn neighbors_for_update(
        &self,
        store: &Store<'_>,
        vertex: VertexId,
        edge_type: EdgeTypeId,
    ) -> Result<RoaringBitmap> {
        let key = Edges::key_to_bytes(&EdgeCfKey(self.code, vertex, edge_type));
        match store.get_for_update(Edges::CF_NAME, &key)? {
            Some(bytes) => Ok(RoaringBitmap::deserialize_from(&bytes[..])?),
            None => Ok(RoaringBitmap::new()),
        }
    }

    /// Out-degree of `vertex` under `edge_type`.
    pub fn degree(&self, store: &Store<'_>, vertex: VertexId, edge_type: EdgeTypeId) -> Result<u64> {
        Ok(self.neighbors(store, vertex, edge_type)?.len())
    }

    /// Create the directed edge `from -> to` under `edge_type`.
    ///
    /// No uniqueness check beyond the set semantics of the adjacency bitmap.
    pub fn add_edge(
        &self,
        store: &Store<'_>,
        from: VertexId,
        to: VertexId,
        edge_type: EdgeTypeId,
    ) -> Result<()> {
        let mut bitmap = self.neighbors_for_update(store, from, edge_type)?;
        bitmap.insert(to);
        self.write_neighbors(store, from, edge_type, &bitmap)
    }

    /// Replace the whole out-adjacency of `vertex` under `edge_type`.
    ///
    /// Old edges are removed and the new set written in the same transaction.
    pub fn replace_edges(
        &self,
        store: &Store<'_>,
        vertex: VertexId,
        edge_type: EdgeTypeId,
        neighbors: &RoaringBitmap,
    ) -> Result<()> {
        self.write_neighbors(store, vertex, edge_type, neighbors)
    }

    fn write_neighbors(
        &self,
        store: &Store<'_>,
        vertex: VertexId,
        edge_type: EdgeTypeId,
        neighbors: &RoaringBitmap,
    ) -> Result<()> {
        let key = Edges::key_to_bytes(&EdgeCfKey(self.code, vertex, edge_type));
        let mut buf = Vec::with_capacity(neighbors.serialized_size());
        neighbors.serialize_into(&mut buf)?;
        store.put(Edges::CF_NAME, &key, &buf)
    }

    // =========================================================================
    // Edge type registry
    // =========================================================================

    /// Look up a registered edge type by name.
    pub fn edge_type(&self, store: &Store<'_>, name: &str) -> Result<Option<EdgeTypeId>> {
        if let Some(id) = self.edge_types.get(name) {
            return Ok(Some(*id));
        }
        let key = Meta::edge_type_key(self.code, name);
        match store.get(Meta::CF_NAME, &key)? {
            Some(bytes) if bytes.len() == 2 => {
                let id = EdgeTypeId::from_be_bytes(bytes[..].try_into()?);
                self.edge_types.insert(name.to_string(), id);
                Ok(Some(id))
            }
            Some(_) => Err(anyhow!("Corrupt edge type entry for '{}'", name)),
            None => Ok(None),
        }
    }

    /// Register an edge type by name, creating it lazily.
    ///
    /// Requires an open transaction. The in-memory cache is populated only
    /// from committed lookups, so a rolled-back registration is simply
    /// re-done on the next call.
    pub fn get_or_create_edge_type(&self, store: &Store<'_>, name: &str) -> Result<EdgeTypeId> {
        if let Some(id) = self.edge_types.get(name) {
            return Ok(*id);
        }

        let key = Meta::edge_type_key(self.code, name);
        if let Some(bytes) = store.get_for_update(Meta::CF_NAME, &key)? {
            if bytes.len() != 2 {
                return Err(anyhow!("Corrupt edge type entry for '{}'", name));
            }
            let id = EdgeTypeId::from_be_bytes(bytes[..].try_into()?);
            self.edge_types.insert(name.to_string(), id);
            return Ok(id);
        }

        let seq_key = Meta::edge_type_seq_key(self.code);
        let next = match store.get_for_update(Meta::CF_NAME, &seq_key)? {
            Some(bytes) if bytes.len() == 2 => EdgeTypeId::from_be_bytes(bytes[..].try_into()?),
            _ => 0,
        };
        store.put(Meta::CF_NAME, &seq_key, &(next + 1).to_be_bytes())?;
        store.put(Meta::CF_NAME, &key, &next.to_be_bytes())?;
        Ok(next)
    }
}
