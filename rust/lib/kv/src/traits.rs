use crate::error::KVError;

/// Byte-level key-value storage with a read-only key layer.
///
/// Keys are namespaced with colons: `app:application:{id}`,
/// `config:plugin:{id}`. Keys loaded from disk at startup are read-only;
/// everything else is read-write.
///
/// Every call is synchronous. Async callers run these on a blocking pool.
pub trait KVStore: Send + Sync {
    /// Get the value for a key. Returns None if the key does not exist.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KVError>;

    /// Set a key-value pair. Returns KVError::ReadOnly for file-layer keys.
    fn set(&self, key: &str, value: &[u8]) -> Result<(), KVError>;

    /// Delete a key. Returns KVError::ReadOnly for file-layer keys.
    fn delete(&self, key: &str) -> Result<(), KVError>;

    /// Scan all keys matching a prefix. Returns (key, value) pairs sorted by key.
    fn scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, KVError>;

    /// Check whether a key is in the read-only layer.
    fn is_readonly(&self, key: &str) -> bool;
}
