use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::error::KVError;
use crate::traits::KVStore;

/// Two-layer KV store.
///
/// - **File layer** (read-only, higher priority): catalog entries loaded
///   from the data directory at startup.
/// - **DB layer** (read-write): any concrete KVStore, normally redb.
///
/// Reads check the file layer first. Writes to a file-layer key fail with
/// `KVError::ReadOnly`. `scan` merges both layers and the file layer wins
/// on duplicate keys.
pub struct OverlayKV<DB: KVStore> {
    file_layer: RwLock<BTreeMap<String, Vec<u8>>>,
    db: DB,
}

impl<DB: KVStore> OverlayKV<DB> {
    pub fn new(db: DB) -> Self {
        Self {
            file_layer: RwLock::new(BTreeMap::new()),
            db,
        }
    }

    /// Insert an entry into the read-only layer. Called by FileLoader.
    pub fn insert_file_entry(&self, key: String, value: Vec<u8>) {
        let mut layer = self.file_layer.write().unwrap_or_else(|e| e.into_inner());
        layer.insert(key, value);
    }

    pub fn file_layer_len(&self) -> usize {
        self.file_layer.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl<DB: KVStore> KVStore for OverlayKV<DB> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KVError> {
        {
            let layer = self.file_layer.read().unwrap_or_else(|e| e.into_inner());
            if let Some(value) = layer.get(key) {
                return Ok(Some(value.clone()));
            }
        }
        self.db.get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), KVError> {
        if self.is_readonly(key) {
            return Err(KVError::ReadOnly(key.to_string()));
        }
        self.db.set(key, value)
    }

    fn delete(&self, key: &str) -> Result<(), KVError> {
        if self.is_readonly(key) {
            return Err(KVError::ReadOnly(key.to_string()));
        }
        self.db.delete(key)
    }

    fn scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, KVError> {
        let mut merged: BTreeMap<String, Vec<u8>> = self.db.scan(prefix)?.into_iter().collect();

        let layer = self.file_layer.read().unwrap_or_else(|e| e.into_inner());
        for (key, value) in layer.range(prefix.to_string()..) {
            if !key.starts_with(prefix) {
                break;
            }
            merged.insert(key.clone(), value.clone());
        }

        Ok(merged.into_iter().collect())
    }

    fn is_readonly(&self, key: &str) -> bool {
        self.file_layer
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RedbStore;

    fn overlay() -> OverlayKV<RedbStore> {
        OverlayKV::new(RedbStore::open_in_memory().unwrap())
    }

    #[test]
    fn file_layer_is_read_only() {
        let kv = overlay();
        kv.insert_file_entry("config:plugin:rest".into(), b"file".to_vec());

        assert!(kv.is_readonly("config:plugin:rest"));
        assert!(matches!(
            kv.set("config:plugin:rest", b"db"),
            Err(KVError::ReadOnly(_))
        ));
        assert!(matches!(
            kv.delete("config:plugin:rest"),
            Err(KVError::ReadOnly(_))
        ));
        assert_eq!(kv.get("config:plugin:rest").unwrap().unwrap(), b"file");
    }

    #[test]
    fn scan_merges_layers_file_wins() {
        let kv = overlay();
        kv.set("config:plugin:a", b"db-a").unwrap();
        kv.set("config:plugin:c", b"db-c").unwrap();
        kv.insert_file_entry("config:plugin:a".into(), b"file-a".to_vec());
        kv.insert_file_entry("config:plugin:b".into(), b"file-b".to_vec());

        let all = kv.scan("config:plugin:").unwrap();
        assert_eq!(
            all,
            vec![
                ("config:plugin:a".to_string(), b"file-a".to_vec()),
                ("config:plugin:b".to_string(), b"file-b".to_vec()),
                ("config:plugin:c".to_string(), b"db-c".to_vec()),
            ]
        );
        assert_eq!(kv.file_layer_len(), 2);
    }

    #[test]
    fn db_keys_are_writable() {
        let kv = overlay();
        kv.set("app:application:1", b"v1").unwrap();
        kv.set("app:application:1", b"v2").unwrap();
        assert_eq!(kv.get("app:application:1").unwrap().unwrap(), b"v2");
        kv.delete("app:application:1").unwrap();
        assert!(kv.get("app:application:1").unwrap().is_none());
    }
}
