//! Column family definitions for the property-graph layer.
//!
//! Five column families share one RocksDB database:
//!
//! | CF | Key | Value |
//! |----|-----|-------|
//! | `graph/meta` | namespaced string keys | descriptor JSON / BE integers |
//! | `graph/vertices` | `[index: u64][vertex: u32]` | MessagePack+LZ4 `VertexRecord` |
//! | `graph/vectors` | `[index: u64][vertex: u32]` | raw f32 LE array |
//! | `graph/edges` | `[index: u64][vertex: u32][edge type: u16]` | RoaringBitmap |
//! | `graph/external_ids` | `[index: u64][id bytes]` | `vertex: u32` BE |
//!
//! Keys are direct byte concatenations so RocksDB prefix extractors can use
//! constant-length prefixes; all integers are big-endian for ordered scans.

use anyhow::Result;
use rocksdb::{BlockBasedOptions, Cache, ColumnFamilyDescriptor, Options, SliceTransform};
use serde::{Deserialize, Serialize};

use crate::rocksdb::{BlockCacheConfig, ColumnFamily, ColumnFamilyRecord};

/// Identifies one index (one vertex type) within the database.
pub type IndexCode = u64;

/// Compact vertex identity, allocated sequentially per index.
pub type VertexId = u32;

/// Identifies a registered edge type within an index.
pub type EdgeTypeId = u16;

/// All column families, opened together by `Storage::ready()`.
pub const ALL_COLUMN_FAMILIES: &[&str] = &[
    Meta::CF_NAME,
    Vertices::CF_NAME,
    Vectors::CF_NAME,
    Edges::CF_NAME,
    ExternalIds::CF_NAME,
];

// ============================================================================
// Meta CF
// ============================================================================

/// Meta column family - descriptors, code allocation, edge-type registry.
pub struct Meta;

impl ColumnFamily for Meta {
    const CF_NAME: &'static str = "graph/meta";
}

impl Meta {
    /// Key of the persisted index descriptor for a vertex type.
    pub fn descriptor_key(vertex_type: &str) -> Vec<u8> {
        let mut key = b"descriptor:".to_vec();
        key.extend_from_slice(vertex_type.as_bytes());
        key
    }

    /// Key of the index code assigned to a vertex type.
    pub fn code_key(vertex_type: &str) -> Vec<u8> {
        let mut key = b"code:".to_vec();
        key.extend_from_slice(vertex_type.as_bytes());
        key
    }

    /// Key of the next unassigned index code.
    pub fn next_code_key() -> Vec<u8> {
        b"next_code".to_vec()
    }

    /// Key of the vertex id sequence for an index.
    pub fn vertex_seq_key(code: IndexCode) -> Vec<u8> {
        let mut key = b"vertex_seq:".to_vec();
        key.extend_from_slice(&code.to_be_bytes());
        key
    }

    /// Key of a registered edge type within an index.
    pub fn edge_type_key(code: IndexCode, name: &str) -> Vec<u8> {
        let mut key = b"edge_type:".to_vec();
        key.extend_from_slice(&code.to_be_bytes());
        key.push(b':');
        key.extend_from_slice(name.as_bytes());
        key
    }

    /// Key of the edge type id sequence for an index.
    pub fn edge_type_seq_key(code: IndexCode) -> Vec<u8> {
        let mut key = b"edge_type_seq:".to_vec();
        key.extend_from_slice(&code.to_be_bytes());
        key
    }
}

// ============================================================================
// Vertices CF
// ============================================================================

/// Vertices column family - one record per vertex.
pub struct Vertices;

/// Vertices key: (index code, vertex id)
#[derive(Debug, Clone)]
pub struct VertexCfKey(pub IndexCode, pub VertexId);

/// Vertex record stored under the vertex key.
///
/// The vector payload lives in its own column family; `max_level` absent in
/// older records deserializes as 0.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VertexRecord {
    pub external_id: String,
    #[serde(default)]
    pub max_level: u8,
}

impl ColumnFamily for Vertices {
    const CF_NAME: &'static str = "graph/vertices";
}

impl ColumnFamilyRecord for Vertices {
    type Key = VertexCfKey;
    type Value = VertexRecord;

    fn key_to_bytes(key: &Self::Key) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(12);
        bytes.extend_from_slice(&key.0.to_be_bytes());
        bytes.extend_from_slice(&key.1.to_be_bytes());
        bytes
    }

    fn key_from_bytes(bytes: &[u8]) -> Result<Self::Key> {
        if bytes.len() != 12 {
            anyhow::bail!(
                "Invalid VertexCfKey length: expected 12, got {}",
                bytes.len()
            );
        }
        let code = IndexCode::from_be_bytes(bytes[0..8].try_into()?);
        let vertex = VertexId::from_be_bytes(bytes[8..12].try_into()?);
        Ok(VertexCfKey(code, vertex))
    }
    // value_to_bytes / value_from_bytes use the default MessagePack + LZ4 impl
}

// ============================================================================
// Vectors CF
// ============================================================================

/// Vectors column family - raw f32 vector storage.
///
/// Key: [index: u64] + [vertex: u32] = 12 bytes
/// Value: f32[dim] as raw little-endian bytes
pub struct Vectors;

/// Vectors key: (index code, vertex id)
#[derive(Debug, Clone)]
pub struct VectorCfKey(pub IndexCode, pub VertexId);

impl ColumnFamily for Vectors {
    const CF_NAME: &'static str = "graph/vectors";
}

impl Vectors {
    pub fn key_to_bytes(key: &VectorCfKey) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(12);
        bytes.extend_from_slice(&key.0.to_be_bytes());
        bytes.extend_from_slice(&key.1.to_be_bytes());
        bytes
    }

    pub fn key_from_bytes(bytes: &[u8]) -> Result<VectorCfKey> {
        if bytes.len() != 12 {
            anyhow::bail!(
                "Invalid VectorCfKey length: expected 12, got {}",
                bytes.len()
            );
        }
        let code = IndexCode::from_be_bytes(bytes[0..8].try_into()?);
        let vertex = VertexId::from_be_bytes(bytes[8..12].try_into()?);
        Ok(VectorCfKey(code, vertex))
    }

    /// Store vector as raw f32 little-endian bytes.
    pub fn value_to_bytes(value: &[f32]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(value.len() * 4);
        for &v in value {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes
    }

    /// Load vector from raw f32 little-endian bytes.
    pub fn value_from_bytes(bytes: &[u8]) -> Result<Vec<f32>> {
        if bytes.len() % 4 != 0 {
            anyhow::bail!(
                "Invalid vector bytes length: {} is not divisible by 4",
                bytes.len()
            );
        }
        let mut vector = Vec::with_capacity(bytes.len() / 4);
        for chunk in bytes.chunks_exact(4) {
            vector.push(f32::from_le_bytes(chunk.try_into()?));
        }
        Ok(vector)
    }
}

// ============================================================================
// Edges CF
// ============================================================================

/// Edges column family - out-adjacency per (vertex, edge type).
///
/// Key: [index: u64] + [vertex: u32] + [edge type: u16] = 14 bytes
/// Value: serialized RoaringBitmap of neighbor vertex ids
pub struct Edges;

/// Edges key: (index code, vertex id, edge type id)
#[derive(Debug, Clone)]
pub struct EdgeCfKey(pub IndexCode, pub VertexId, pub EdgeTypeId);

impl ColumnFamily for Edges {
    const CF_NAME: &'static str = "graph/edges";
}

impl Edges {
    pub fn key_to_bytes(key: &EdgeCfKey) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(14);
        bytes.extend_from_slice(&key.0.to_be_bytes());
        bytes.extend_from_slice(&key.1.to_be_bytes());
        bytes.extend_from_slice(&key.2.to_be_bytes());
        bytes
    }

    pub fn key_from_bytes(bytes: &[u8]) -> Result<EdgeCfKey> {
        if bytes.len() != 14 {
            anyhow::bail!("Invalid EdgeCfKey length: expected 14, got {}", bytes.len());
        }
        let code = IndexCode::from_be_bytes(bytes[0..8].try_into()?);
        let vertex = VertexId::from_be_bytes(bytes[8..12].try_into()?);
        let edge_type = EdgeTypeId::from_be_bytes(bytes[12..14].try_into()?);
        Ok(EdgeCfKey(code, vertex, edge_type))
    }

    /// Prefix of all adjacency rows of one vertex (12 bytes).
    pub fn vertex_prefix(code: IndexCode, vertex: VertexId) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(12);
        bytes.extend_from_slice(&code.to_be_bytes());
        bytes.extend_from_slice(&vertex.to_be_bytes());
        bytes
    }
}

// ============================================================================
// ExternalIds CF
// ============================================================================

/// External id column family - the unique secondary index on the id property.
///
/// Key: [index: u64] + [external id bytes]
/// Value: vertex id as 4 big-endian bytes
pub struct ExternalIds;

impl ColumnFamily for ExternalIds {
    const CF_NAME: &'static str = "graph/external_ids";
}

impl ExternalIds {
    pub fn key_to_bytes(code: IndexCode, external_id: &str) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8 + external_id.len());
        bytes.extend_from_slice(&code.to_be_bytes());
        bytes.extend_from_slice(external_id.as_bytes());
        bytes
    }

    pub fn value_to_bytes(vertex: VertexId) -> Vec<u8> {
        vertex.to_be_bytes().to_vec()
    }

    pub fn value_from_bytes(bytes: &[u8]) -> Result<VertexId> {
        if bytes.len() != 4 {
            anyhow::bail!(
                "Invalid external id value length: expected 4, got {}",
                bytes.len()
            );
        }
        Ok(VertexId::from_be_bytes(bytes.try_into()?))
    }
}

// ============================================================================
// Column family options
// ============================================================================

/// Build descriptors for all column families with a shared block cache.
pub fn cf_descriptors(cache: &Cache, config: &BlockCacheConfig) -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(Meta::CF_NAME, meta_options(cache, config)),
        ColumnFamilyDescriptor::new(Vertices::CF_NAME, vertices_options(cache, config)),
        ColumnFamilyDescriptor::new(Vectors::CF_NAME, vectors_options(cache, config)),
        ColumnFamilyDescriptor::new(Edges::CF_NAME, edges_options(cache, config)),
        ColumnFamilyDescriptor::new(ExternalIds::CF_NAME, external_ids_options(cache, config)),
    ]
}

fn meta_options(cache: &Cache, config: &BlockCacheConfig) -> Options {
    let mut opts = Options::default();
    let mut block_opts = BlockBasedOptions::default();
    block_opts.set_block_cache(cache);
    block_opts.set_block_size(config.default_block_size);
    opts.set_block_based_table_factory(&block_opts);
    opts
}

fn vertices_options(cache: &Cache, config: &BlockCacheConfig) -> Options {
    // No prefix extractor: attach scans this CF in reverse across the
    // prefix boundary to recover the id sequence.
    let mut opts = Options::default();
    let mut block_opts = BlockBasedOptions::default();
    block_opts.set_block_cache(cache);
    block_opts.set_block_size(config.default_block_size);
    block_opts.set_bloom_filter(10.0, false);
    opts.set_block_based_table_factory(&block_opts);
    opts
}

fn vectors_options(cache: &Cache, config: &BlockCacheConfig) -> Options {
    let mut opts = Options::default();
    let mut block_opts = BlockBasedOptions::default();
    block_opts.set_block_cache(cache);
    block_opts.set_block_size(config.vector_block_size);
    opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
    opts.set_prefix_extractor(SliceTransform::create_fixed_prefix(8));
    opts.set_block_based_table_factory(&block_opts);
    opts
}

fn edges_options(cache: &Cache, config: &BlockCacheConfig) -> Options {
    let mut opts = Options::default();
    let mut block_opts = BlockBasedOptions::default();
    block_opts.set_block_cache(cache);
    block_opts.set_block_size(config.default_block_size);
    // Bloom filter is critical for neighbor lookups during graph traversal
    block_opts.set_bloom_filter(10.0, false);
    opts.set_compression_type(rocksdb::DBCompressionType::None);
    opts.set_prefix_extractor(SliceTransform::create_fixed_prefix(12));
    opts.set_block_based_table_factory(&block_opts);
    opts
}

fn external_ids_options(cache: &Cache, config: &BlockCacheConfig) -> Options {
    let mut opts = Options::default();
    let mut block_opts = BlockBasedOptions::default();
    block_opts.set_block_cache(cache);
    block_opts.set_block_size(config.default_block_size);
    block_opts.set_bloom_filter(10.0, false);
    opts.set_prefix_extractor(SliceTransform::create_fixed_prefix(8));
    opts.set_block_based_table_factory(&block_opts);
    opts
}
