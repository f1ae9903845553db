//! RocksDB storage infrastructure.
//!
//! - `cf` - column family traits and block cache configuration
//! - `storage` - the `Storage` handle owning the `TransactionDB`
//! - `store` - transactional key-value view used by the graph layer

mod cf;
mod storage;
mod store;

pub use cf::{BlockCacheConfig, ColumnFamily, ColumnFamilyRecord};
pub use storage::Storage;
pub use store::Store;
