use std::path::Path;

use redb::backends::InMemoryBackend;
use redb::{Database, ReadableTable, TableDefinition};

use crate::error::KVError;
use crate::traits::KVStore;

const TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("documents");

/// KVStore backed by a redb database. Every key is writable.
///
/// Each call runs in its own transaction, so a single `set` is atomic
/// but there is no cross-key atomicity.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create a redb database at the given path.
    pub fn open(path: &Path) -> Result<Self, KVError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(KVError::storage)?;
            }
        }
        let db = Database::create(path).map_err(KVError::storage)?;
        Self::init(db)
    }

    /// Volatile store for tests and ephemeral tooling.
    pub fn open_in_memory() -> Result<Self, KVError> {
        let db = Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .map_err(KVError::storage)?;
        Self::init(db)
    }

    fn init(db: Database) -> Result<Self, KVError> {
        // Create the table up front so read transactions never miss it.
        let write_txn = db.begin_write().map_err(KVError::storage)?;
        {
            let _table = write_txn.open_table(TABLE).map_err(KVError::storage)?;
        }
        write_txn.commit().map_err(KVError::storage)?;
        Ok(Self { db })
    }
}

impl KVStore for RedbStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KVError> {
        let read_txn = self.db.begin_read().map_err(KVError::storage)?;
        let table = read_txn.open_table(TABLE).map_err(KVError::storage)?;
        let value = table.get(key).map_err(KVError::storage)?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), KVError> {
        let write_txn = self.db.begin_write().map_err(KVError::storage)?;
        {
            let mut table = write_txn.open_table(TABLE).map_err(KVError::storage)?;
            table.insert(key, value).map_err(KVError::storage)?;
        }
        write_txn.commit().map_err(KVError::storage)
    }

    fn delete(&self, key: &str) -> Result<(), KVError> {
        let write_txn = self.db.begin_write().map_err(KVError::storage)?;
        {
            let mut table = write_txn.open_table(TABLE).map_err(KVError::storage)?;
            table.remove(key).map_err(KVError::storage)?;
        }
        write_txn.commit().map_err(KVError::storage)
    }

    fn scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, KVError> {
        let read_txn = self.db.begin_read().map_err(KVError::storage)?;
        let table = read_txn.open_table(TABLE).map_err(KVError::storage)?;

        let mut results = Vec::new();
        for entry in table.range(prefix..).map_err(KVError::storage)? {
            let (key, value) = entry.map_err(KVError::storage)?;
            let key = key.value();
            if !key.starts_with(prefix) {
                break;
            }
            results.push((key.to_string(), value.value().to_vec()));
        }
        Ok(results)
    }

    fn is_readonly(&self, _key: &str) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_delete() {
        let store = RedbStore::open_in_memory().unwrap();
        assert!(store.get("app:application:1").unwrap().is_none());

        store.set("app:application:1", b"one").unwrap();
        assert_eq!(store.get("app:application:1").unwrap().unwrap(), b"one");

        store.delete("app:application:1").unwrap();
        assert!(store.get("app:application:1").unwrap().is_none());
        // Deleting a missing key is not an error.
        store.delete("app:application:1").unwrap();
    }

    #[test]
    fn scan_stops_at_prefix_boundary() {
        let store = RedbStore::open_in_memory().unwrap();
        store.set("app:page:b", b"2").unwrap();
        store.set("app:page:a", b"1").unwrap();
        store.set("app:pages", b"x").unwrap();
        store.set("app:action:a", b"3").unwrap();

        let pages = store.scan("app:page:").unwrap();
        let keys: Vec<_> = pages.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["app:page:a", "app:page:b"]);
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data.redb");
        {
            let store = RedbStore::open(&path).unwrap();
            store.set("k", b"v").unwrap();
        }
        let store = RedbStore::open(&path).unwrap();
        assert_eq!(store.get("k").unwrap().unwrap(), b"v");
    }
}
