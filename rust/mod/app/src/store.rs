//! Document trait + DocOps typed storage.
//!
//! Each model impls `Document` to declare its KV prefix, key and hooks.
//! `DocOps<T>` stores documents as JSON in a KVStore and answers
//! permission-filtered reads. Every call runs on the blocking pool.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use lowcode_core::{Principal, ServiceError};
use lowcode_kv::{KVError, KVStore};

use crate::model::{EntityKind, Permission, PolicyHolder};
use crate::pool::BlockingPool;

/// Storage behavior of a governed, soft-deletable document.
pub trait Document:
    PolicyHolder + Serialize + DeserializeOwned + Clone + Send + Sync + 'static
{
    const KIND: EntityKind;

    /// KV key prefix: "{module}:{resource}:".
    fn kv_prefix() -> &'static str;

    fn key_value(&self) -> String;

    fn is_deleted(&self) -> bool;

    fn mark_deleted(&mut self);

    /// Called before inserting a new document.
    fn before_create(&mut self) {}

    /// Called before every save of an existing document.
    fn before_update(&mut self) {}
}

pub(crate) fn kv_err(e: KVError) -> ServiceError {
    match e {
        KVError::ReadOnly(key) => ServiceError::ReadOnly(format!("key '{}' is read-only", key)),
        other => ServiceError::Storage(other.to_string()),
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ServiceError> {
    serde_json::from_slice(bytes).map_err(|e| ServiceError::Internal(format!("deserialize: {}", e)))
}

fn encode<T: Serialize>(doc: &T) -> Result<Vec<u8>, ServiceError> {
    serde_json::to_vec(doc).map_err(|e| ServiceError::Internal(format!("serialize: {}", e)))
}

/// Typed document store over a KV backend.
pub struct DocOps<T: Document> {
    kv: Arc<dyn KVStore>,
    pool: BlockingPool,
    _phantom: PhantomData<fn() -> T>,
}

impl<T: Document> DocOps<T> {
    pub fn new(kv: Arc<dyn KVStore>, pool: BlockingPool) -> Self {
        Self {
            kv,
            pool,
            _phantom: PhantomData,
        }
    }

    fn make_key(id: &str) -> String {
        format!("{}{}", T::kv_prefix(), id)
    }

    fn not_found(id: &str) -> ServiceError {
        ServiceError::NotFound(format!("{} '{}' not found", T::KIND.as_str(), id))
    }

    /// Raw read by id. Archived documents are returned too.
    pub async fn get(&self, id: &str) -> Result<Option<T>, ServiceError> {
        let kv = Arc::clone(&self.kv);
        let key = Self::make_key(id);
        self.pool
            .run(move || match kv.get(&key).map_err(kv_err)? {
                Some(bytes) => decode(&bytes).map(Some),
                None => Ok(None),
            })
            .await
    }

    /// Live document visible to `principal` under `permission`.
    ///
    /// Missing, archived and invisible documents all yield NotFound.
    pub async fn find_by_id(
        &self,
        id: &str,
        permission: Permission,
        principal: &Principal,
    ) -> Result<T, ServiceError> {
        match self.get(id).await? {
            Some(doc) if !doc.is_deleted() && doc.policies().allows(permission, principal) => {
                Ok(doc)
            }
            _ => Err(Self::not_found(id)),
        }
    }

    /// Every live document matching `filter`, ignoring permissions.
    /// For invariant checks such as name uniqueness.
    pub async fn find_live<F>(&self, filter: F) -> Result<Vec<T>, ServiceError>
    where
        F: Fn(&T) -> bool + Send,
    {
        let kv = Arc::clone(&self.kv);
        let docs = self
            .pool
            .run(move || {
                kv.scan(T::kv_prefix())
                    .map_err(kv_err)?
                    .iter()
                    .map(|(_key, bytes)| decode::<T>(bytes))
                    .collect::<Result<Vec<T>, ServiceError>>()
            })
            .await?;
        Ok(docs
            .into_iter()
            .filter(|doc| !doc.is_deleted() && filter(doc))
            .collect())
    }

    /// Live documents matching `filter` that `principal` holds `permission` on.
    pub async fn find_many<F>(
        &self,
        filter: F,
        permission: Permission,
        principal: &Principal,
    ) -> Result<Vec<T>, ServiceError>
    where
        F: Fn(&T) -> bool + Send,
    {
        let docs = self.find_live(filter).await?;
        Ok(docs
            .into_iter()
            .filter(|doc| doc.policies().allows(permission, principal))
            .collect())
    }

    /// Store a new document. Conflict if the id is taken, archived or not.
    pub async fn insert(&self, mut doc: T) -> Result<T, ServiceError> {
        doc.before_create();
        let kv = Arc::clone(&self.kv);
        self.pool
            .run(move || {
                let id = doc.key_value();
                let key = Self::make_key(&id);
                if kv.get(&key).map_err(kv_err)?.is_some() {
                    return Err(ServiceError::Conflict(format!(
                        "{} '{}' already exists",
                        T::KIND.as_str(),
                        id
                    )));
                }
                kv.set(&key, &encode(&doc)?).map_err(kv_err)?;
                Ok(doc)
            })
            .await
    }

    /// Overwrite a document. Last writer wins.
    pub async fn save(&self, mut doc: T) -> Result<T, ServiceError> {
        doc.before_update();
        let kv = Arc::clone(&self.kv);
        self.pool
            .run(move || {
                let key = Self::make_key(&doc.key_value());
                kv.set(&key, &encode(&doc)?).map_err(kv_err)?;
                Ok(doc)
            })
            .await
    }

    /// Soft-delete: flag the document and keep the row.
    pub async fn archive(&self, mut doc: T) -> Result<T, ServiceError> {
        doc.mark_deleted();
        self.save(doc).await
    }
}
