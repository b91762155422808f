//! Application lifecycle engine of the low-code builder.
//!
//! Applications own pages, pages own actions and action collections, and
//! those reference shared datasources. Pages, actions and collections keep
//! a draft and a published snapshot; [`AppService::publish`] moves one to
//! the other. Visibility changes and clones fan out over the whole graph
//! as detached jobs.

pub mod jobs;
pub mod model;
pub mod plugin;
pub mod pool;
pub mod service;
pub mod store;

mod store_impls;

use std::sync::Arc;

use tracing::info;

use lowcode_core::{ServiceConfig, ServiceError};
use lowcode_kv::{FileLoader, KVStore, OverlayKV, RedbStore};

pub use jobs::{JobHandle, JobRunner};
pub use plugin::{KvPluginRegistry, PluginRegistry};
pub use pool::BlockingPool;
pub use service::{AppConfig, AppError, AppService};

use store::kv_err;

/// The application module: storage, plugin catalog and service wired
/// together from a [`ServiceConfig`].
pub struct AppModule {
    service: Arc<AppService>,
}

impl AppModule {
    /// Open the database, load the plugin catalog and build the service.
    pub fn open(config: &ServiceConfig, app_config: AppConfig) -> Result<Self, ServiceError> {
        let db = RedbStore::open(&config.resolve_db_path()).map_err(kv_err)?;
        let overlay = OverlayKV::new(db);
        let plugin_dir = config.resolve_plugin_dir();
        let plugins = FileLoader::load_plugins(&plugin_dir, &overlay).map_err(kv_err)?;
        info!("loaded {plugins} plugins from {}", plugin_dir.display());

        let kv: Arc<dyn KVStore> = Arc::new(overlay);
        let registry = Arc::new(KvPluginRegistry::new(Arc::clone(&kv)));
        let pool = BlockingPool::new(config.blocking_threads);
        Ok(Self {
            service: AppService::new(kv, registry, pool, app_config),
        })
    }

    pub fn service(&self) -> &Arc<AppService> {
        &self.service
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CreateApplication;
    use lowcode_core::Principal;

    #[tokio::test]
    async fn open_wires_storage_and_plugins() {
        let dir = tempfile::tempdir().unwrap();
        let plugin_dir = dir.path().join("plugins");
        std::fs::create_dir_all(&plugin_dir).unwrap();
        std::fs::write(plugin_dir.join("postgres-plugin.yaml"), "name: PostgreSQL\ntype: DB\n")
            .unwrap();

        let config = ServiceConfig::from_args(&[format!("--data-dir={}", dir.path().display())]);
        let module = AppModule::open(&config, AppConfig::default()).unwrap();
        let svc = module.service();
        assert!(svc.plugins.exists("postgres-plugin").unwrap());

        let user = Principal::new("api_user").with_organization("org-1");
        let app = svc
            .create_application(
                CreateApplication {
                    name: "Foo".into(),
                    ..Default::default()
                },
                "org-1",
                &user,
            )
            .await
            .unwrap();
        assert_eq!(app.pages.len(), 1);
        assert!(dir.path().join("data.redb").exists());
    }
}
