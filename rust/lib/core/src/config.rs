use std::path::PathBuf;

/// Storage and runtime configuration shared by every embedding service.
///
/// Parsed from command-line arguments by the host process, then passed to
/// storage initialization.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Root data directory. Holds the redb file and the read-only
    /// `plugins/` catalog.
    pub data_dir: Option<PathBuf>,

    /// Path to the redb database file.
    /// Defaults to `{data_dir}/data.redb` if not specified.
    pub db_path: Option<PathBuf>,

    /// Directory of plugin descriptors (YAML).
    /// Defaults to `{data_dir}/plugins/` if not specified.
    pub plugin_dir: Option<PathBuf>,

    /// Upper bound on concurrently running blocking storage calls.
    pub blocking_threads: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            db_path: None,
            plugin_dir: None,
            blocking_threads: 16,
        }
    }
}

impl ServiceConfig {
    /// Parse configuration from command-line arguments.
    ///
    /// Supported flags:
    /// - `--data-dir=PATH`
    /// - `--db=PATH`
    /// - `--plugin-dir=PATH`
    /// - `--blocking-threads=N`
    ///
    /// Unknown flags and unparsable numbers are ignored.
    pub fn from_args(args: &[String]) -> Self {
        let mut config = ServiceConfig::default();

        for arg in args {
            if let Some(val) = arg.strip_prefix("--data-dir=") {
                config.data_dir = Some(PathBuf::from(val));
            } else if let Some(val) = arg.strip_prefix("--db=") {
                config.db_path = Some(PathBuf::from(val));
            } else if let Some(val) = arg.strip_prefix("--plugin-dir=") {
                config.plugin_dir = Some(PathBuf::from(val));
            } else if let Some(val) = arg.strip_prefix("--blocking-threads=") {
                if let Ok(n) = val.parse::<usize>() {
                    config.blocking_threads = n.max(1);
                }
            }
        }

        config
    }

    /// Resolve the redb database path, falling back to `{data_dir}/data.redb`.
    pub fn resolve_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.resolve_data_subpath("data.redb"))
    }

    /// Resolve the plugin catalog directory.
    pub fn resolve_plugin_dir(&self) -> PathBuf {
        self.plugin_dir
            .clone()
            .unwrap_or_else(|| self.resolve_data_subpath("plugins"))
    }

    fn resolve_data_subpath(&self, name: &str) -> PathBuf {
        self.data_dir
            .as_ref()
            .map(|d| d.join(name))
            .unwrap_or_else(|| PathBuf::from(name))
    }
}
