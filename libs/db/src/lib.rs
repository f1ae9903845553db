//! trellis-db: a persistent, graph-backed HNSW index.
//!
//! Indexed items are vertices of a property graph stored in RocksDB; HNSW
//! layer adjacency is materialized as typed directed edges, one edge type
//! per layer. The index supports concurrent insertion and k-NN queries, can
//! be seeded by bulk-importing an in-memory HNSW, and serializes as a
//! compact JSON parameter descriptor.
//!
//! ```ignore
//! use trellis_db::{Index, Storage};
//! use trellis_db::vector::Distance;
//!
//! let mut storage = Storage::readwrite(path);
//! storage.ready()?;
//!
//! let index = Index::builder(128, Distance::Cosine, 1_000_000)
//!     .with_vertex_type("Document")
//!     .build(&storage)?;
//!
//! index.insert(&storage, "doc-1", &embedding)?;
//! let hits = index.find_nearest(&storage, &query, 10)?;
//! ```

pub mod graph;
pub mod rocksdb;
pub mod vector;

pub use graph::{EdgeTypeId, IndexCode, VertexId};
pub use rocksdb::Storage;
pub use vector::{Index, IndexBuilder, RamIndex, SearchResult, Vertex};
