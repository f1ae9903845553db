//! Column family trait definitions.
//!
//! - `ColumnFamily`: base marker trait with `CF_NAME` (single source of truth)
//! - `ColumnFamilyRecord`: typed key/value codec; values use MessagePack + LZ4
//!
//! Keys use direct byte concatenation (not MessagePack) to enable RocksDB
//! prefix extractors with constant-length prefixes. Column families with
//! hot-path value formats (raw f32 vectors, roaring bitmaps) define their
//! codecs as inherent methods instead of implementing `ColumnFamilyRecord`.

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Base marker trait for column family types.
///
/// # Example
///
/// ```rust,ignore
/// impl ColumnFamily for Vertices {
///     const CF_NAME: &'static str = "graph/vertices";
/// }
/// ```
pub trait ColumnFamily {
    /// Column family name (with prefix, e.g., "graph/vertices")
    const CF_NAME: &'static str;
}

/// Typed key/value codec for a column family.
///
/// Values are serialized with MessagePack for a self-describing format,
/// then compressed with LZ4.
pub trait ColumnFamilyRecord: ColumnFamily {
    /// The key type for this column family
    type Key;

    /// The value type for this column family
    type Value: Serialize + DeserializeOwned;

    /// Serialize the key to bytes using direct concatenation.
    fn key_to_bytes(key: &Self::Key) -> Vec<u8>;

    /// Deserialize the key from bytes (direct format, no MessagePack).
    fn key_from_bytes(bytes: &[u8]) -> Result<Self::Key>;

    /// Serialize the value using MessagePack, then compress with LZ4.
    fn value_to_bytes(value: &Self::Value) -> Result<Vec<u8>> {
        let encoded = rmp_serde::to_vec(value)?;
        lz4::block::compress(&encoded, None, true)
            .map_err(|e| anyhow::anyhow!("lz4 compress: {}", e))
    }

    /// Decompress with LZ4, then deserialize the value using MessagePack.
    fn value_from_bytes(bytes: &[u8]) -> Result<Self::Value> {
        let decoded = lz4::block::decompress(bytes, None)
            .map_err(|e| anyhow::anyhow!("lz4 decompress: {}", e))?;
        Ok(rmp_serde::from_slice(&decoded)?)
    }
}

/// Block cache configuration shared by all column families.
#[derive(Debug, Clone)]
pub struct BlockCacheConfig {
    /// Total shared block cache size in bytes.
    pub cache_size_bytes: usize,
    /// Block size for metadata-style column families.
    pub default_block_size: usize,
    /// Block size for the vector column family (larger values, fewer blocks).
    pub vector_block_size: usize,
}

impl Default for BlockCacheConfig {
    fn default() -> Self {
        Self {
            cache_size_bytes: 128 * 1024 * 1024,
            default_block_size: 4 * 1024,
            vector_block_size: 16 * 1024,
        }
    }
}
