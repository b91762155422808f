use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::KVError;
use crate::overlay::OverlayKV;
use crate::traits::KVStore;

/// Key prefix for plugin descriptors in the read-only layer.
pub const PLUGIN_KEY_PREFIX: &str = "config:plugin:";

/// Populates the read-only layer of an OverlayKV from disk.
///
/// ```text
/// plugins/
/// ├── restapi-plugin.yaml   → config:plugin:restapi-plugin
/// ├── postgres-plugin.yaml  → config:plugin:postgres-plugin
/// └── js-plugin.yml         → config:plugin:js-plugin
/// ```
pub struct FileLoader;

impl FileLoader {
    /// Load every YAML file in `plugin_dir` as a plugin descriptor.
    /// A missing directory loads nothing. Returns the number of entries.
    pub fn load_plugins<DB: KVStore>(
        plugin_dir: &Path,
        overlay: &OverlayKV<DB>,
    ) -> Result<usize, KVError> {
        if !plugin_dir.is_dir() {
            debug!("FileLoader: plugin dir {:?} does not exist, skipping", plugin_dir);
            return Ok(0);
        }
        let count = Self::load_directory(plugin_dir, PLUGIN_KEY_PREFIX, overlay)?;
        debug!("FileLoader: loaded {} plugins from {:?}", count, plugin_dir);
        Ok(count)
    }

    /// Load a flat directory of YAML files under a key prefix.
    fn load_directory<DB: KVStore>(
        dir: &Path,
        prefix: &str,
        overlay: &OverlayKV<DB>,
    ) -> Result<usize, KVError> {
        let mut count = 0;
        for entry in fs::read_dir(dir).map_err(KVError::storage)? {
            let path = entry.map_err(KVError::storage)?.path();
            if !path.is_file() || !Self::is_yaml(&path) {
                continue;
            }

            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                warn!("FileLoader: skipping non-utf8 file name {:?}", path);
                continue;
            };

            let data = fs::read(&path).map_err(KVError::storage)?;
            overlay.insert_file_entry(format!("{}{}", prefix, stem), data);
            count += 1;
        }
        Ok(count)
    }

    fn is_yaml(path: &Path) -> bool {
        matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        )
    }
}
