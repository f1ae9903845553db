//! Concurrency primitives for the insertion protocol.
//!
//! Three resources, acquired in the fixed order global -> vertex -> excluded:
//!
//! - the global insert lock, held as a droppable guard so the early-release
//!   optimization can give it up once entry-point promotion is impossible;
//! - a sharded per-vertex lock table used while scanning a vertex's
//!   out-neighbors during descent (never the storage object itself);
//! - the process-wide excluded-candidate set of vertices whose
//!   neighborhoods are still being built.

use std::sync::{Mutex, MutexGuard};

use dashmap::DashSet;

use crate::graph::VertexId;

const LOCK_SHARDS: usize = 64;

/// Sharded per-vertex mutation locks.
///
/// Locks interleave across vertices that hash to the same shard; a holder
/// never acquires a second vertex lock, so shard collisions cannot deadlock.
pub(crate) struct VertexLocks {
    shards: Vec<Mutex<()>>,
}

impl VertexLocks {
    pub fn new() -> Self {
        Self {
            shards: (0..LOCK_SHARDS).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Lock the shard owning `vertex`.
    pub fn lock(&self, vertex: VertexId) -> MutexGuard<'_, ()> {
        self.shards[vertex as usize % LOCK_SHARDS]
            .lock()
            .expect("poisoned vertex lock")
    }
}

/// Vertices currently being inserted by some thread.
///
/// Members are never chosen as neighbors because their own neighborhood is
/// still under construction. Membership operations are brief and the set is
/// never held while acquiring another lock.
pub(crate) struct ExcludedSet {
    set: DashSet<VertexId>,
}

impl ExcludedSet {
    pub fn new() -> Self {
        Self { set: DashSet::new() }
    }

    /// Mark `vertex` as in-flight; the guard removes it on drop.
    pub fn insert(&self, vertex: VertexId) -> ExcludedGuard<'_> {
        self.set.insert(vertex);
        ExcludedGuard { set: &self.set, vertex }
    }

    pub fn contains(&self, vertex: VertexId) -> bool {
        self.set.contains(&vertex)
    }
}

/// Removes its vertex from the excluded set when dropped, on success and
/// error paths alike.
pub(crate) struct ExcludedGuard<'a> {
    set: &'a DashSet<VertexId>,
    vertex: VertexId,
}

impl Drop for ExcludedGuard<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.vertex);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_locks_distinct_shards() {
        let locks = VertexLocks::new();
        let _a = locks.lock(0);
        let _b = locks.lock(1);
    }

    #[test]
    fn test_excluded_guard_removes_on_drop() {
        let excluded = ExcludedSet::new();
        {
            let _guard = excluded.insert(7);
            assert!(excluded.contains(7));
        }
        assert!(!excluded.contains(7));
    }
}
