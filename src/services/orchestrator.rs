//! src/services/orchestrator.rs
//!
//! StorageOrchestrator: resolves a backend kind to its provider. The default
//! backend (where new uploads go) is chosen from configuration; every
//! operation can also name its backend explicitly, which is what migration
//! uses so it never has to flip shared state.

use crate::{
    models::{
        backend::BackendKind,
        object::{
            DeletedObject, ObjectKey, ObjectMetadata, RetrievedObject, StoredObject,
            StoredObjectDescriptor,
        },
        report::BackendStats,
    },
    services::{
        database_provider::DatabaseProvider,
        error::{StorageError, StorageResult},
        filesystem_provider::FilesystemProvider,
        provider::StorageProvider,
    },
};
use sqlx::SqlitePool;
use std::{collections::HashMap, path::PathBuf, sync::Arc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct StorageOrchestrator {
    providers: Arc<HashMap<BackendKind, Arc<dyn StorageProvider>>>,
    default_backend: Arc<RwLock<BackendKind>>,
}

impl StorageOrchestrator {
    /// Wire up the filesystem and database providers.
    pub fn new(
        default_backend: BackendKind,
        storage_dir: impl Into<PathBuf>,
        db: Arc<SqlitePool>,
    ) -> Self {
        let filesystem: Arc<dyn StorageProvider> = Arc::new(FilesystemProvider::new(storage_dir));
        let database: Arc<dyn StorageProvider> = Arc::new(DatabaseProvider::new(db));
        Self::from_providers(default_backend, [filesystem, database])
    }

    /// Build from arbitrary providers, keyed by their own `kind()`.
    pub fn from_providers(
        default_backend: BackendKind,
        providers: impl IntoIterator<Item = Arc<dyn StorageProvider>>,
    ) -> Self {
        let providers = providers
            .into_iter()
            .map(|provider| (provider.kind(), provider))
            .collect::<HashMap<_, _>>();

        info!(
            default_backend = %default_backend,
            backends = providers.len(),
            "storage orchestrator ready"
        );

        Self {
            providers: Arc::new(providers),
            default_backend: Arc::new(RwLock::new(default_backend)),
        }
    }

    /// Backend that receives new uploads.
    pub async fn default_backend(&self) -> BackendKind {
        *self.default_backend.read().await
    }

    /// Change the backend for new uploads. Existing objects stay where their
    /// records say they are.
    pub async fn switch_provider(&self, kind: BackendKind) -> StorageResult<BackendKind> {
        self.provider(kind)?;
        let mut current = self.default_backend.write().await;
        let previous = std::mem::replace(&mut *current, kind);
        info!(from = %previous, to = %kind, "switched default storage backend");
        Ok(previous)
    }

    pub fn provider(&self, kind: BackendKind) -> StorageResult<Arc<dyn StorageProvider>> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or(StorageError::Unsupported {
                backend: kind,
                operation: "storage",
            })
    }

    pub fn backends(&self) -> Vec<BackendKind> {
        BackendKind::ALL
            .into_iter()
            .filter(|kind| self.providers.contains_key(kind))
            .collect()
    }

    // --- Default-backend operations ---

    pub async fn store(
        &self,
        key: &ObjectKey,
        object: &StoredObjectDescriptor,
    ) -> StorageResult<StoredObject> {
        let kind = self.default_backend().await;
        self.store_in(kind, key, object).await
    }

    pub async fn retrieve(&self, key: &ObjectKey) -> StorageResult<RetrievedObject> {
        let kind = self.default_backend().await;
        self.retrieve_from(kind, key).await
    }

    pub async fn delete(&self, key: &ObjectKey) -> StorageResult<DeletedObject> {
        let kind = self.default_backend().await;
        self.delete_from(kind, key).await
    }

    pub async fn exists(&self, key: &ObjectKey) -> StorageResult<bool> {
        let kind = self.default_backend().await;
        self.exists_in(kind, key).await
    }

    pub async fn metadata(&self, key: &ObjectKey) -> StorageResult<Option<ObjectMetadata>> {
        let kind = self.default_backend().await;
        self.metadata_in(kind, key).await
    }

    pub async fn stats(&self) -> StorageResult<BackendStats> {
        let kind = self.default_backend().await;
        self.stats_for(kind).await
    }

    // --- Explicit-backend operations ---

    pub async fn store_in(
        &self,
        kind: BackendKind,
        key: &ObjectKey,
        object: &StoredObjectDescriptor,
    ) -> StorageResult<StoredObject> {
        let result = self.provider(kind)?.store(key, object).await;
        match &result {
            Ok(stored) => debug!(
                backend = %kind,
                id = %key.id,
                size = stored.size,
                checksum = %stored.checksum,
                "store succeeded"
            ),
            Err(err) => warn!(backend = %kind, id = %key.id, reason = err.reason(), error = %err, "store failed"),
        }
        result
    }

    pub async fn retrieve_from(
        &self,
        kind: BackendKind,
        key: &ObjectKey,
    ) -> StorageResult<RetrievedObject> {
        let result = self.provider(kind)?.retrieve(key).await;
        match &result {
            Ok(object) => debug!(backend = %kind, id = %key.id, size = object.size, "retrieve succeeded"),
            Err(err) => warn!(backend = %kind, id = %key.id, reason = err.reason(), error = %err, "retrieve failed"),
        }
        result
    }

    pub async fn delete_from(
        &self,
        kind: BackendKind,
        key: &ObjectKey,
    ) -> StorageResult<DeletedObject> {
        let result = self.provider(kind)?.delete(key).await;
        match &result {
            Ok(deleted) => debug!(
                backend = %kind,
                id = %key.id,
                freed_bytes = deleted.freed_bytes,
                "delete succeeded"
            ),
            Err(err) => warn!(backend = %kind, id = %key.id, reason = err.reason(), error = %err, "delete failed"),
        }
        result
    }

    pub async fn exists_in(&self, kind: BackendKind, key: &ObjectKey) -> StorageResult<bool> {
        let exists = self.provider(kind)?.exists(key).await?;
        debug!(backend = %kind, id = %key.id, exists, "exists check");
        Ok(exists)
    }

    pub async fn metadata_in(
        &self,
        kind: BackendKind,
        key: &ObjectKey,
    ) -> StorageResult<Option<ObjectMetadata>> {
        let meta = self.provider(kind)?.metadata(key).await?;
        debug!(backend = %kind, id = %key.id, found = meta.is_some(), "metadata lookup");
        Ok(meta)
    }

    pub async fn stats_for(&self, kind: BackendKind) -> StorageResult<BackendStats> {
        let stats = self.provider(kind)?.stats().await?;
        debug!(
            backend = %kind,
            objects = stats.object_count,
            bytes = stats.total_bytes,
            "collected backend stats"
        );
        Ok(stats)
    }
}
