//! Transactional key-value view over the database.
//!
//! `Store` abstracts over "reads against committed state" and "reads through
//! an open transaction". During an insert, all reads flow through the
//! insert's transaction so the thread observes its own uncommitted edge
//! writes; search paths read committed state directly.

use anyhow::{anyhow, Result};
use rocksdb::{Direction, IteratorMode, Transaction, TransactionDB};

/// A read/write view bound to either the database or an open transaction.
#[derive(Clone, Copy)]
pub struct Store<'a> {
    txn_db: &'a TransactionDB,
    txn: Option<&'a Transaction<'a, TransactionDB>>,
}

impl<'a> Store<'a> {
    /// View over committed state (no transaction).
    pub fn db(txn_db: &'a TransactionDB) -> Self {
        Self { txn_db, txn: None }
    }

    /// View through an open transaction (read-your-writes).
    pub fn txn(txn_db: &'a TransactionDB, txn: &'a Transaction<'a, TransactionDB>) -> Self {
        Self {
            txn_db,
            txn: Some(txn),
        }
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.txn_db
            .cf_handle(name)
            .ok_or_else(|| anyhow!("Column family {} not found", name))
    }

    fn require_txn(&self) -> Result<&'a Transaction<'a, TransactionDB>> {
        self.txn
            .ok_or_else(|| anyhow!("Operation requires an open transaction"))
    }

    /// Point read.
    pub fn get(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.cf(cf_name)?;
        let value = match self.txn {
            Some(txn) => txn.get_cf(cf, key)?,
            None => self.txn_db.get_cf(cf, key)?,
        };
        Ok(value)
    }

    /// Point read with an exclusive row lock held until the transaction
    /// commits or rolls back. The lock is taken even when the key is absent,
    /// which serializes concurrent read-modify-write cycles on the same row.
    pub fn get_for_update(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.cf(cf_name)?;
        let txn = self.require_txn()?;
        Ok(txn.get_for_update_cf(cf, key, true)?)
    }

    /// Point write. Outside a transaction this is a single atomic write.
    pub fn put(&self, cf_name: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let cf = self.cf(cf_name)?;
        match self.txn {
            Some(txn) => txn.put_cf(cf, key, value)?,
            None => self.txn_db.put_cf(cf, key, value)?,
        }
        Ok(())
    }

    /// Point delete.
    pub fn delete(&self, cf_name: &str, key: &[u8]) -> Result<()> {
        let cf = self.cf(cf_name)?;
        match self.txn {
            Some(txn) => txn.delete_cf(cf, key)?,
            None => self.txn_db.delete_cf(cf, key)?,
        }
        Ok(())
    }

    /// Collect all `(key, value)` pairs whose key starts with `prefix`.
    pub fn prefix_scan(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let cf = self.cf(cf_name)?;
        let mode = IteratorMode::From(prefix, Direction::Forward);

        let mut rows = Vec::new();
        match self.txn {
            Some(txn) => {
                for item in txn.iterator_cf(cf, mode) {
                    let (key, value) = item?;
                    if !key.starts_with(prefix) {
                        break;
                    }
                    rows.push((key.to_vec(), value.to_vec()));
                }
            }
            None => {
                for item in self.txn_db.iterator_cf(cf, mode) {
                    let (key, value) = item?;
                    if !key.starts_with(prefix) {
                        break;
                    }
                    rows.push((key.to_vec(), value.to_vec()));
                }
            }
        }
        Ok(rows)
    }

    /// Return the last key within `prefix`, if any.
    ///
    /// Seeks to the first key at or after the upper bound of the prefix
    /// range and steps backwards once.
    pub fn last_in_prefix(&self, cf_name: &str, prefix: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.cf(cf_name)?;

        let mut upper = prefix.to_vec();
        // Increment the prefix to form an exclusive upper bound; a prefix of
        // all 0xff bytes has no upper bound and falls back to the end.
        let mode = if increment(&mut upper) {
            IteratorMode::From(&upper, Direction::Reverse)
        } else {
            IteratorMode::End
        };

        let item = match self.txn {
            Some(txn) => txn.iterator_cf(cf, mode).next(),
            None => self.txn_db.iterator_cf(cf, mode).next(),
        };

        match item {
            Some(row) => {
                let (key, _) = row?;
                if key.starts_with(prefix) {
                    Ok(Some(key.to_vec()))
                } else {
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }
}

/// Treat `bytes` as a big-endian integer and add one in place.
/// Returns false on overflow (all bytes were 0xff).
fn increment(bytes: &mut [u8]) -> bool {
    for b in bytes.iter_mut().rev() {
        if *b != 0xff {
            *b += 1;
            return true;
        }
        *b = 0;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_simple() {
        let mut bytes = vec![0x00, 0x01];
        assert!(increment(&mut bytes));
        assert_eq!(bytes, vec![0x00, 0x02]);
    }

    #[test]
    fn test_increment_carry() {
        let mut bytes = vec![0x00, 0xff];
        assert!(increment(&mut bytes));
        assert_eq!(bytes, vec![0x01, 0x00]);
    }

    #[test]
    fn test_increment_overflow() {
        let mut bytes = vec![0xff, 0xff];
        assert!(!increment(&mut bytes));
    }
}
