//! Bulk import of an in-memory HNSW into the persistent graph.
//!
//! The import streams the origin twice, in transactions of
//! `transaction_batch_size` items:
//!
//! - Pass 1 materializes every origin node as a vertex (id, vector, max
//!   level) and records the origin-id -> vertex-id mapping, tracking the
//!   running maximum level.
//! - The entry point is then assigned from the mapped origin entry point
//!   and every layer's edge type is pre-created in the schema.
//! - Pass 2 writes each node's per-layer neighbor lists as adjacency rows.
//!   The origin guarantees duplicate-free lists, so no deduplication
//!   happens beyond the set semantics of the bitmap.
//!
//! The importer is a single-threaded bulk operation and must not run
//! concurrently with online inserts.

use anyhow::Result;
use roaring::RoaringBitmap;

use crate::graph::VertexId;
use crate::rocksdb::{Storage, Store};

use super::ram::RamIndex;
use super::Index;

pub(crate) fn import(index: &Index, storage: &Storage, origin: &RamIndex) -> Result<()> {
    let txn_db = storage.transaction_db()?;
    let batch_size = index.transaction_batch_size.max(1);

    tracing::info!(
        items = origin.len(),
        batch_size,
        "importing origin nodes as vertices"
    );

    // Pass 1: materialize vertices and the origin-id -> vertex-id mapping.
    let mut mapping: Vec<VertexId> = Vec::with_capacity(origin.len());
    let mut max_level = 0u8;

    let mut txn = txn_db.transaction();
    for (count, node) in origin.iter_nodes().enumerate() {
        max_level = max_level.max(node.max_level);

        let store = Store::txn(txn_db, &txn);
        let vertex =
            index
                .adapter
                .graph()
                .create_vertex(&store, node.external_id, node.vector, node.max_level)?;
        mapping.push(vertex);

        if (count + 1) % batch_size == 0 {
            txn.commit()?;
            tracing::info!(saved = count + 1, "saved vertices");
            txn = txn_db.transaction();
        }
    }
    txn.commit()?;

    tracing::info!(max_level, "all origin nodes saved");

    // Assign the entry point from the mapped origin entry point, and make
    // sure every layer's edge type exists before edges are written.
    let txn = txn_db.transaction();
    {
        let store = Store::txn(txn_db, &txn);
        if let Some(origin_entry) = origin.entry_point() {
            index.persist_entry_point(&store, Some(mapping[origin_entry as usize]))?;
        }
        for layer in 0..=max_level {
            index.adapter.ensure_layer(&store, layer)?;
        }
    }
    txn.commit()?;

    if let Some(origin_entry) = origin.entry_point() {
        index.store_entry_point(Some(mapping[origin_entry as usize]));
    }

    // Pass 2: wire the edges.
    let mut total_edges = 0u64;
    let mut txn = txn_db.transaction();
    for (count, node) in origin.iter_nodes().enumerate() {
        let store = Store::txn(txn_db, &txn);
        let source = mapping[node.id as usize];

        for (layer, connections) in node.connections.iter().enumerate() {
            if connections.is_empty() {
                continue;
            }
            let neighbors: RoaringBitmap = connections
                .iter()
                .map(|&origin_id| mapping[origin_id as usize])
                .collect();
            total_edges += neighbors.len();
            index
                .adapter
                .replace_neighbors(&store, source, layer as u8, &neighbors)?;
        }

        if (count + 1) % batch_size == 0 {
            txn.commit()?;
            tracing::info!(connected = count + 1, total_edges, "connected vertices");
            txn = txn_db.transaction();
        }
    }
    txn.commit()?;

    tracing::info!(total_edges, "bulk import complete");
    Ok(())
}
