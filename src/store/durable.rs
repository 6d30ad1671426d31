//! ACID-durable persistence backed by redb.
//!
//! The memory layer writes every resource record through here as a single
//! key-value pair (resource IRI → bincode bytes) and scans the whole table
//! back on open. All writes go through transactions; reads use MVCC
//! snapshots.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};

use crate::error::StoreError;
use crate::store::StoreResult;

/// Table holding resource records (IRI bytes → bincode-encoded resource).
const RESOURCE_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("resources");

/// ACID-durable store using redb.
pub struct DurableStore {
    db: Arc<Database>,
}

impl DurableStore {
    /// Open or create a durable store in the given directory.
    pub fn open(data_dir: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(data_dir).map_err(|e| StoreError::Io { source: e })?;
        let db_path = data_dir.join("per-ankh.redb");
        let db = Database::create(&db_path).map_err(|e| StoreError::Redb {
            message: format!("failed to open redb at {}: {e}", db_path.display()),
        })?;
        let store = Self { db: Arc::new(db) };
        // Ensure the table exists so a scan on a fresh database succeeds.
        let txn = store.db.begin_write().map_err(|e| StoreError::Redb {
            message: format!("begin_write failed: {e}"),
        })?;
        txn.open_table(RESOURCE_TABLE)
            .map_err(|e| StoreError::Redb {
                message: format!("open_table failed: {e}"),
            })?;
        txn.commit().map_err(|e| StoreError::Redb {
            message: format!("commit failed: {e}"),
        })?;
        Ok(store)
    }

    /// Store a resource record with full ACID guarantees.
    pub fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(|e| StoreError::Redb {
            message: format!("begin_write failed: {e}"),
        })?;
        {
            let mut table = txn
                .open_table(RESOURCE_TABLE)
                .map_err(|e| StoreError::Redb {
                    message: format!("open_table failed: {e}"),
                })?;
            table.insert(key, value).map_err(|e| StoreError::Redb {
                message: format!("insert failed: {e}"),
            })?;
        }
        txn.commit().map_err(|e| StoreError::Redb {
            message: format!("commit failed: {e}"),
        })?;
        Ok(())
    }

    /// Read a record by key. Returns `Ok(None)` if the key doesn't exist.
    pub fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let txn = self.db.begin_read().map_err(|e| StoreError::Redb {
            message: format!("begin_read failed: {e}"),
        })?;
        let table = txn
            .open_table(RESOURCE_TABLE)
            .map_err(|e| StoreError::Redb {
                message: format!("open_table failed: {e}"),
            })?;
        let result = table.get(key).map_err(|e| StoreError::Redb {
            message: format!("get failed: {e}"),
        })?;
        Ok(result.map(|guard| guard.value().to_vec()))
    }

    /// Delete a key. Returns whether the key existed.
    pub fn remove(&self, key: &[u8]) -> StoreResult<bool> {
        let txn = self.db.begin_write().map_err(|e| StoreError::Redb {
            message: format!("begin_write failed: {e}"),
        })?;
        let existed = {
            let mut table = txn
                .open_table(RESOURCE_TABLE)
                .map_err(|e| StoreError::Redb {
                    message: format!("open_table failed: {e}"),
                })?;
            let result = table.remove(key).map_err(|e| StoreError::Redb {
                message: format!("remove failed: {e}"),
            })?;
            result.is_some()
        };
        txn.commit().map_err(|e| StoreError::Redb {
            message: format!("commit failed: {e}"),
        })?;
        Ok(existed)
    }

    /// Read every stored record, for the load-on-open rebuild.
    pub fn scan_all(&self) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let txn = self.db.begin_read().map_err(|e| StoreError::Redb {
            message: format!("begin_read failed: {e}"),
        })?;
        let table = txn
            .open_table(RESOURCE_TABLE)
            .map_err(|e| StoreError::Redb {
                message: format!("open_table failed: {e}"),
            })?;
        let mut records = Vec::new();
        let iter = table.iter().map_err(|e| StoreError::Redb {
            message: format!("iter failed: {e}"),
        })?;
        for entry in iter {
            let (key, value) = entry.map_err(|e| StoreError::Redb {
                message: format!("scan failed: {e}"),
            })?;
            records.push((key.value().to_vec(), value.value().to_vec()));
        }
        Ok(records)
    }
}

impl std::fmt::Debug for DurableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableStore").finish()
    }
}
