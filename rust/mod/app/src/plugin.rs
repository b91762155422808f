use std::sync::Arc;

use lowcode_core::ServiceError;
use lowcode_kv::KVStore;
use lowcode_kv::file_loader::PLUGIN_KEY_PREFIX;

use crate::model::Plugin;
use crate::store::kv_err;

/// Installed-plugin lookup. Datasource creation only needs `exists`.
///
/// Implementations may block; callers go through the blocking pool.
pub trait PluginRegistry: Send + Sync {
    fn get(&self, plugin_id: &str) -> Result<Option<Plugin>, ServiceError>;

    fn list(&self) -> Result<Vec<Plugin>, ServiceError>;

    fn exists(&self, plugin_id: &str) -> Result<bool, ServiceError> {
        Ok(self.get(plugin_id)?.is_some())
    }
}

/// Registry backed by the read-only plugin catalog in the KV overlay.
pub struct KvPluginRegistry {
    kv: Arc<dyn KVStore>,
}

impl KvPluginRegistry {
    pub fn new(kv: Arc<dyn KVStore>) -> Self {
        Self { kv }
    }

    fn parse(id: &str, bytes: &[u8]) -> Result<Plugin, ServiceError> {
        let mut plugin: Plugin = serde_yaml::from_slice(bytes)
            .map_err(|e| ServiceError::Internal(format!("plugin '{}': {}", id, e)))?;
        if plugin.id.is_empty() {
            plugin.id = id.to_string();
        }
        Ok(plugin)
    }
}

impl PluginRegistry for KvPluginRegistry {
    fn get(&self, plugin_id: &str) -> Result<Option<Plugin>, ServiceError> {
        let key = format!("{}{}", PLUGIN_KEY_PREFIX, plugin_id);
        match self.kv.get(&key).map_err(kv_err)? {
            Some(bytes) => Self::parse(plugin_id, &bytes).map(Some),
            None => Ok(None),
        }
    }

    fn list(&self) -> Result<Vec<Plugin>, ServiceError> {
        self.kv
            .scan(PLUGIN_KEY_PREFIX)
            .map_err(kv_err)?
            .iter()
            .map(|(key, bytes)| {
                let id = key.strip_prefix(PLUGIN_KEY_PREFIX).unwrap_or(key);
                Self::parse(id, bytes)
            })
            .collect()
    }
}
