pub mod access;
pub mod action;
pub mod application;
pub mod clone;
pub mod git;
pub mod page;
pub mod publish;

mod fanout;
mod subtree;

use std::sync::Arc;

use thiserror::Error;

use lowcode_core::{Principal, ServiceError};
use lowcode_kv::KVStore;

use crate::jobs::JobRunner;
use crate::model::{Action, ActionCollection, Application, Datasource, Page};
use crate::plugin::PluginRegistry;
use crate::pool::BlockingPool;
use crate::store::DocOps;

/// Errors of the application lifecycle engine.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// A required field is missing or malformed. Raised before any write.
    #[error("validation: {0}")]
    Validation(String),

    /// A multi-document operation stopped part-way. Completed writes are
    /// not rolled back.
    #[error("{operation} failed after {written} writes ({failed} failed): {source}")]
    PartialFailure {
        operation: &'static str,
        written: usize,
        failed: usize,
        #[source]
        source: ServiceError,
    },

    #[error("read-only: {0}")]
    ReadOnly(String),

    #[error("storage: {0}")]
    Storage(String),

    #[error("internal: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::NotFound(m) => AppError::NotFound(m),
            ServiceError::Conflict(m) => AppError::Conflict(m),
            ServiceError::Validation(m) => AppError::Validation(m),
            ServiceError::ReadOnly(m) => AppError::ReadOnly(m),
            ServiceError::Storage(m) => AppError::Storage(m),
            ServiceError::PartialFailure(m) | ServiceError::Internal(m) => AppError::Internal(m),
        }
    }
}

impl From<AppError> for ServiceError {
    fn from(e: AppError) -> Self {
        match e {
            AppError::NotFound(m) => ServiceError::NotFound(m),
            AppError::Conflict(m) => ServiceError::Conflict(m),
            AppError::Validation(m) => ServiceError::Validation(m),
            e @ AppError::PartialFailure { .. } => ServiceError::PartialFailure(e.to_string()),
            AppError::ReadOnly(m) => ServiceError::ReadOnly(m),
            AppError::Storage(m) => ServiceError::Storage(m),
            AppError::Internal(m) => ServiceError::Internal(m),
        }
    }
}

impl AppError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }
}

/// Configuration for the application service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Name of the page every new application starts with.
    pub default_page_name: String,
    /// Appended to the source name when cloning: "Orders" → "Orders Copy".
    pub clone_name_suffix: String,
    /// Comment field of generated OpenSSH public keys.
    pub ssh_key_comment: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_page_name: "Page1".to_string(),
            clone_name_suffix: "Copy".to_string(),
            ssh_key_comment: "lowcode-git".to_string(),
        }
    }
}

/// The application service. Holds the document stores, the plugin
/// registry and the job runner for detached work.
pub struct AppService {
    pub(crate) applications: DocOps<Application>,
    pub(crate) pages: DocOps<Page>,
    pub(crate) actions: DocOps<Action>,
    pub(crate) collections: DocOps<ActionCollection>,
    pub(crate) datasources: DocOps<Datasource>,
    pub(crate) plugins: Arc<dyn PluginRegistry>,
    pub(crate) pool: BlockingPool,
    pub(crate) jobs: JobRunner,
    pub(crate) config: AppConfig,
}

impl AppService {
    pub fn new(
        kv: Arc<dyn KVStore>,
        plugins: Arc<dyn PluginRegistry>,
        pool: BlockingPool,
        config: AppConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            applications: DocOps::new(Arc::clone(&kv), pool.clone()),
            pages: DocOps::new(Arc::clone(&kv), pool.clone()),
            actions: DocOps::new(Arc::clone(&kv), pool.clone()),
            collections: DocOps::new(Arc::clone(&kv), pool.clone()),
            datasources: DocOps::new(kv, pool.clone()),
            plugins,
            pool,
            jobs: JobRunner::new(),
            config,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Detached clone/propagation jobs. Drain before shutdown.
    pub fn jobs(&self) -> &JobRunner {
        &self.jobs
    }
}

/// Reject blank required fields before touching storage.
pub(crate) fn require(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    Ok(())
}

/// Organization-scoped writes need membership. Outsiders see NotFound.
pub(crate) fn require_member(principal: &Principal, organization_id: &str) -> Result<(), AppError> {
    if !principal.is_member_of(organization_id) {
        return Err(AppError::NotFound(format!(
            "organization '{organization_id}' not found"
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::Path;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use lowcode_core::{Principal, ServiceConfig};
    use lowcode_kv::{FileLoader, KVError, KVStore, OverlayKV, RedbStore};

    use super::{AppConfig, AppService};
    use crate::plugin::KvPluginRegistry;
    use crate::pool::BlockingPool;

    pub const ORG: &str = "org-1";
    pub const PLUGIN: &str = "restapi-plugin";

    pub fn owner() -> Principal {
        Principal::new("api_user").with_organization(ORG)
    }

    /// KVStore wrapper that fails writes under a key prefix once armed.
    pub struct FailingKv {
        inner: Arc<dyn KVStore>,
        prefix: String,
        armed: AtomicBool,
        writes: AtomicUsize,
    }

    impl FailingKv {
        pub fn arm(&self) {
            self.armed.store(true, Ordering::SeqCst);
        }

        pub fn disarm(&self) {
            self.armed.store(false, Ordering::SeqCst);
        }

        /// Successful writes under the prefix so far.
        pub fn writes(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }

        fn check(&self, key: &str) -> Result<(), KVError> {
            if self.armed.load(Ordering::SeqCst) && key.starts_with(&self.prefix) {
                return Err(KVError::Storage(format!("injected failure writing {key}")));
            }
            Ok(())
        }
    }

    impl KVStore for FailingKv {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KVError> {
            self.inner.get(key)
        }
        fn set(&self, key: &str, value: &[u8]) -> Result<(), KVError> {
            self.check(key)?;
            self.inner.set(key, value)?;
            if key.starts_with(&self.prefix) {
                self.writes.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
        fn delete(&self, key: &str) -> Result<(), KVError> {
            self.check(key)?;
            self.inner.delete(key)
        }
        fn scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, KVError> {
            self.inner.scan(prefix)
        }
        fn is_readonly(&self, key: &str) -> bool {
            self.inner.is_readonly(key)
        }
    }

    fn overlay_with_plugins(dir: &Path) -> Arc<dyn KVStore> {
        let plugin_dir = dir.join("plugins");
        std::fs::create_dir_all(&plugin_dir).unwrap();
        std::fs::write(
            plugin_dir.join(format!("{PLUGIN}.yaml")),
            "name: REST API\ntype: API\n",
        )
        .unwrap();

        let config = ServiceConfig {
            data_dir: Some(dir.to_path_buf()),
            ..Default::default()
        };
        let overlay = OverlayKV::new(RedbStore::open(&config.resolve_db_path()).unwrap());
        FileLoader::load_plugins(&config.resolve_plugin_dir(), &overlay).unwrap();
        Arc::new(overlay)
    }

    fn service_over(kv: Arc<dyn KVStore>) -> Arc<AppService> {
        let plugins = Arc::new(KvPluginRegistry::new(Arc::clone(&kv)));
        AppService::new(kv, plugins, BlockingPool::new(8), AppConfig::default())
    }

    pub fn test_service() -> (Arc<AppService>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let kv = overlay_with_plugins(dir.path());
        (service_over(kv), dir)
    }

    /// Service whose writes under `prefix` fail after `arm()`.
    pub fn failing_service(prefix: &str) -> (Arc<AppService>, Arc<FailingKv>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let failing = Arc::new(FailingKv {
            inner: overlay_with_plugins(dir.path()),
            prefix: prefix.to_string(),
            armed: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        });
        let kv: Arc<dyn KVStore> = failing.clone();
        (service_over(kv), failing, dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_failure_maps_to_service_error() {
        let err = AppError::PartialFailure {
            operation: "set_public_access",
            written: 3,
            failed: 1,
            source: ServiceError::Storage("disk full".into()),
        };
        assert_eq!(
            err.to_string(),
            "set_public_access failed after 3 writes (1 failed): disk full"
        );
        let svc: ServiceError = err.into();
        assert_eq!(svc.error_code(), "PARTIAL_FAILURE");
    }

    #[test]
    fn service_error_round_trip_keeps_kind() {
        let e: AppError = ServiceError::NotFound("x".into()).into();
        assert!(e.is_not_found());
        let back: ServiceError = AppError::Conflict("dup".into()).into();
        assert_eq!(back.error_code(), "ALREADY_EXISTS");
    }

    #[test]
    fn require_rejects_blank() {
        assert!(require("name", "  ").is_err());
        assert!(require("name", "Orders").is_ok());
    }

    #[test]
    fn outsiders_do_not_see_organization() {
        let member = Principal::new("api_user").with_organization("org-1");
        assert!(require_member(&member, "org-1").is_ok());
        assert!(require_member(&member, "org-2").unwrap_err().is_not_found());
        assert!(require_member(&Principal::new("outsider"), "org-1").is_err());
    }
}
