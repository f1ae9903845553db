//! Insertion engine.
//!
//! `add` registers an existing graph vertex with the index:
//!
//! 1. Level and locking phase: compute the deterministic layer, take the
//!    global lock, gate on idempotence (any layer-0 out-edge means the
//!    vertex is already registered), persist the layer, and mark the vertex
//!    as an excluded candidate.
//! 2. Early release: once the new layer is known not to exceed the entry
//!    point's, the global lock is dropped - the remaining work cannot
//!    promote the entry point, so concurrent inserters proceed in parallel.
//! 3. Descent phase: greedy walk from the entry point down to the new
//!    vertex's top layer, scanning each vertex's out-neighbors under its
//!    mutation lock.
//! 4. Wiring phase: per layer, a base-layer search at `ef_construction`
//!    width, diversity pruning down to `m`, then bidirectional edges with
//!    degree capping; a full neighbor re-prunes its whole neighborhood,
//!    replacing the adjacency in the same transaction.
//! 5. Promotion: with the global lock still held (guaranteed by the early
//!    release rule), the new vertex becomes the entry point when its layer
//!    exceeds the previous maximum.
//!
//! All reads and writes go through the insert's transaction, so the thread
//! observes its own half-built edges while other threads only ever see
//! committed state.

use std::collections::BinaryHeap;

use anyhow::Result;
use ordered_float::OrderedFloat;

use crate::graph::VertexId;
use crate::rocksdb::{Storage, Store};

use super::adapter::StoredLayers;
use super::error;
use super::heuristic::select_neighbors;
use super::level::assign_level;
use super::search::{greedy_descent, search_base_layer, Candidate, LayerGraph};
use super::Index;

pub(crate) fn add(index: &Index, storage: &Storage, vertex: VertexId) -> Result<bool> {
    let txn_db = storage.transaction_db()?;

    // Precondition and level assignment happen before any lock or mutation.
    let (new_vector, random_level) = {
        let store = Store::db(txn_db);
        let data = index.adapter.require(&store, vertex)?;
        error::check_dimension(index.dimensions, &data.vector)?;
        let level = assign_level(&data.external_id, index.level_lambda);
        (data.vector.clone(), level)
    };

    let mut global = Some(index.global.lock().expect("poisoned global lock"));

    let txn = txn_db.transaction();
    let store = Store::txn(txn_db, &txn);

    if index.adapter.degree(&store, vertex, 0)? > 0 {
        // Already inserted
        return Ok(true);
    }

    index.adapter.set_max_level(&store, vertex, random_level)?;
    let _excluded = index.excluded.insert(vertex);

    let entry = index.entry_point();
    let entry_level = match entry {
        Some(ep) => index.adapter.max_level(&store, ep)?,
        None => 0,
    };

    if entry.is_some() && random_level <= entry_level {
        // Entry-point promotion is impossible from here on; let other
        // inserters through.
        global = None;
    }

    if let Some(ep) = entry {
        let locked = StoredLayers {
            adapter: &index.adapter,
            store: &store,
            locks: Some(&index.vertex_locks),
        };
        let unlocked = StoredLayers {
            adapter: &index.adapter,
            store: &store,
            locks: None,
        };

        let mut current = ep;
        if random_level < entry_level {
            if let Some(mut current_dist) = unlocked.try_distance(&new_vector, current)? {
                for layer in (random_level + 1..=entry_level).rev() {
                    (current, current_dist) =
                        greedy_descent(&locked, &new_vector, current, current_dist, layer)?;
                }
            }
        }

        for layer in (0..=random_level.min(entry_level)).rev() {
            let mut top = search_base_layer(
                &unlocked,
                &new_vector,
                current,
                index.ef_construction,
                layer,
            )?;
            connect_new_vertex(index, &store, &unlocked, vertex, &new_vector, &mut top, layer)?;
        }
    }

    let promoted = entry.is_none() || random_level > entry_level;
    if promoted {
        // Safe: the early-release rule kept the global lock held in exactly
        // these cases.
        debug_assert!(global.is_some());
        index.persist_entry_point(&store, Some(vertex))?;
    }

    txn.commit()?;

    if promoted {
        index.store_entry_point(Some(vertex));
    }
    drop(global);

    tracing::debug!(vertex, level = random_level, promoted, "vertex registered");
    Ok(true)
}

/// Wire the new vertex at one layer: prune the search results down to `m`
/// diverse neighbors, then connect both directions with degree capping.
fn connect_new_vertex(
    index: &Index,
    store: &Store<'_>,
    graph_view: &StoredLayers<'_>,
    vertex: VertexId,
    new_vector: &[f32],
    top: &mut BinaryHeap<Candidate>,
    layer: u8,
) -> Result<()> {
    let best_n = if layer == 0 { index.max_m0 } else { index.max_m };

    select_neighbors(graph_view, top, index.m)?;

    while let Some(selected) = top.pop() {
        let neighbor = selected.vertex;

        // Another inserter's half-built vertex (or this one, reached through
        // freshly wired back-edges): never link to it.
        if index.excluded.contains(neighbor) {
            continue;
        }

        index.adapter.ensure_layer(store, layer)?;
        index.adapter.add_edge(store, vertex, neighbor, layer)?;

        // Row lock held until commit: the degree check and the write below
        // are atomic against concurrent inserters wiring the same neighbor.
        let mut adjacency = index.adapter.neighbors_for_update(store, neighbor, layer)?;

        if (adjacency.len() as usize) < best_n {
            adjacency.insert(vertex);
            index.adapter.replace_neighbors(store, neighbor, layer, &adjacency)?;
        } else {
            // Re-prune the full neighborhood with the new vertex as a
            // candidate; survivors replace the old adjacency wholesale.
            let neighbor_data = index.adapter.require(store, neighbor)?;

            let mut candidates: BinaryHeap<Candidate> = BinaryHeap::new();
            candidates.push(Candidate {
                dist: OrderedFloat(
                    index
                        .adapter
                        .distance()
                        .compute(&neighbor_data.vector, new_vector),
                ),
                vertex,
            });
            for other in adjacency.iter() {
                let Some(dist) = graph_view.try_distance(&neighbor_data.vector, other)? else {
                    continue;
                };
                candidates.push(Candidate {
                    dist: OrderedFloat(dist),
                    vertex: other,
                });
            }

            select_neighbors(graph_view, &mut candidates, best_n)?;

            let survivors: roaring::RoaringBitmap =
                candidates.iter().map(|c| c.vertex).collect();
            index
                .adapter
                .replace_neighbors(store, neighbor, layer, &survivors)?;
        }
    }

    Ok(())
}
