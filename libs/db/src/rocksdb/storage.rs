//! RocksDB storage handle.
//!
//! `Storage` owns the `TransactionDB` shared by the graph layer and the
//! vector index. The database is opened read-write with all column families
//! created on demand; only one read-write instance may access a database
//! path at a time.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use rocksdb::{Options, TransactionDB, TransactionDBOptions};

use super::cf::BlockCacheConfig;
use crate::graph::schema;

/// RocksDB-backed storage for the property graph and vector index.
///
/// # Example
///
/// ```ignore
/// let mut storage = Storage::readwrite(path);
/// storage.ready()?;
/// let txn_db = storage.transaction_db()?;
/// ```
pub struct Storage {
    db_path: PathBuf,
    block_cache_config: BlockCacheConfig,
    db: Option<TransactionDB>,
}

impl Storage {
    /// Create a new Storage instance in read-write mode.
    ///
    /// The database is not opened until `ready()` is called.
    pub fn readwrite(db_path: &Path) -> Self {
        Self {
            db_path: PathBuf::from(db_path),
            block_cache_config: BlockCacheConfig::default(),
            db: None,
        }
    }

    /// Set the block cache configuration.
    ///
    /// Must be called before `ready()` to take effect.
    pub fn with_block_cache_config(mut self, config: BlockCacheConfig) -> Self {
        self.block_cache_config = config;
        self
    }

    /// Open the database and create any missing column families.
    #[tracing::instrument(skip(self), fields(path = ?self.db_path))]
    pub fn ready(&mut self) -> Result<()> {
        if self.db.is_some() {
            return Ok(());
        }

        if self.db_path.try_exists()? && !self.db_path.is_dir() {
            return Err(anyhow!(
                "Database path {} exists but is not a directory",
                self.db_path.display()
            ));
        }

        let mut db_options = Options::default();
        db_options.create_if_missing(true);
        db_options.create_missing_column_families(true);

        // Row-lock waits fail after 100ms; conflicting writers retry.
        let mut txn_db_options = TransactionDBOptions::default();
        txn_db_options.set_txn_lock_timeout(100);
        txn_db_options.set_default_lock_timeout(100);

        let cache = rocksdb::Cache::new_lru_cache(self.block_cache_config.cache_size_bytes);
        let descriptors = schema::cf_descriptors(&cache, &self.block_cache_config);

        let txn_db = TransactionDB::open_cf_descriptors(
            &db_options,
            &txn_db_options,
            &self.db_path,
            descriptors,
        )?;

        tracing::debug!(path = ?self.db_path, "storage ready");
        self.db = Some(txn_db);
        Ok(())
    }

    /// Get the underlying TransactionDB.
    ///
    /// Fails if `ready()` has not been called.
    pub fn transaction_db(&self) -> Result<&TransactionDB> {
        self.db
            .as_ref()
            .ok_or_else(|| anyhow!("Storage not ready; call ready() first"))
    }

    /// Database path.
    pub fn path(&self) -> &Path {
        &self.db_path
    }
}
