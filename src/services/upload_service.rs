//! src/services/upload_service.rs
//!
//! UploadCoordinator: the entry point callers use. It validates uploads,
//! assigns object ids, stores bytes through the orchestrator and keeps the
//! file record in step with where the bytes actually are. Migration and
//! maintenance workflows live in `migration.rs` and `maintenance.rs`.

use crate::{
    models::{
        backend::BackendKind,
        file::{FileLocation, FileRecord, NewFileRecord, UploadDescriptor},
        object::{
            DeletedObject, ObjectKey, ObjectMetadata, RetrievedObject, StoredObject,
            StoredObjectDescriptor,
        },
    },
    services::{
        error::{StorageError, StorageResult},
        locks::ObjectLocks,
        orchestrator::StorageOrchestrator,
        provider::verify_checksum,
        record_store::FileRecords,
    },
};
use bytes::Bytes;
use chrono::TimeDelta;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

/// How old a temp file or unregistered row must be before cleanup treats it
/// as left behind by a crashed upload.
pub const DEFAULT_LEFTOVER_GRACE: TimeDelta = TimeDelta::hours(1);

/// What the caller gets back from a successful upload.
#[derive(Serialize, Clone, Debug)]
pub struct UploadReceipt {
    pub id: Uuid,
    pub backend: BackendKind,
    pub checksum: String,
    /// Relative URL for filesystem objects; database objects are addressed by id.
    pub url: Option<String>,
    pub record: FileRecord,
}

#[derive(Clone, Debug)]
pub struct UploadCoordinator {
    pub(crate) orchestrator: StorageOrchestrator,
    pub(crate) records: FileRecords,
    pub(crate) locks: ObjectLocks,
    /// Prefix for public URLs of filesystem objects (e.g. `/uploads`).
    url_prefix: String,
    pub(crate) leftover_grace: TimeDelta,
}

impl UploadCoordinator {
    pub fn new(
        orchestrator: StorageOrchestrator,
        records: FileRecords,
        url_prefix: impl Into<String>,
    ) -> Self {
        Self {
            orchestrator,
            records,
            locks: ObjectLocks::new(),
            url_prefix: url_prefix.into(),
            leftover_grace: DEFAULT_LEFTOVER_GRACE,
        }
    }

    /// Override [`DEFAULT_LEFTOVER_GRACE`].
    pub fn with_leftover_grace(mut self, grace: TimeDelta) -> Self {
        self.leftover_grace = grace;
        self
    }

    pub fn orchestrator(&self) -> &StorageOrchestrator {
        &self.orchestrator
    }

    pub fn records(&self) -> &FileRecords {
        &self.records
    }

    /// Record fields describing where `stored` landed.
    pub(crate) fn location_for(
        &self,
        kind: BackendKind,
        key: &ObjectKey,
        stored: &StoredObject,
    ) -> FileLocation {
        match kind {
            BackendKind::Filesystem => FileLocation {
                storage_kind: kind,
                path: stored
                    .locator
                    .as_ref()
                    .map(|path| path.to_string_lossy().into_owned()),
                url: Some(format!(
                    "{}/{}",
                    self.url_prefix.trim_end_matches('/'),
                    key.file_name()
                )),
                checksum: stored.checksum.clone(),
            },
            BackendKind::Database => FileLocation {
                storage_kind: kind,
                path: None,
                url: None,
                checksum: stored.checksum.clone(),
            },
        }
    }

    /// Store a new file in the default backend and register it.
    ///
    /// If registration fails the stored bytes are removed again, so a failed
    /// upload leaves neither bytes nor a record.
    pub async fn upload(
        &self,
        payload: Bytes,
        descriptor: UploadDescriptor,
    ) -> StorageResult<UploadReceipt> {
        let declared_size = descriptor.declared_size.unwrap_or(payload.len() as u64);
        let object = StoredObjectDescriptor::new(
            payload,
            descriptor.original_name.trim(),
            descriptor.content_type.trim(),
        )
        .with_declared_size(declared_size)
        .with_encoding(descriptor.encoding.clone());
        object.validate()?;

        let id = Uuid::new_v4();
        let key = ObjectKey::for_file(id, &object.original_name);
        // Held until the record exists, so cleanup cannot take the new bytes
        // for an orphan.
        let _guard = self.locks.write(id).await;
        // Read once so the record names the backend the bytes went to even if
        // the default changes mid-upload.
        let backend = self.orchestrator.default_backend().await;

        let stored = self.orchestrator.store_in(backend, &key, &object).await?;
        let location = self.location_for(backend, &key, &stored);

        let new_record = NewFileRecord {
            id,
            filename: key.file_name(),
            original_name: object.original_name.clone(),
            content_type: object.content_type.clone(),
            extension: key.extension.clone(),
            size_bytes: stored.size as i64,
            encoding: object.encoding.clone(),
            storage_kind: backend,
            path: location.path.clone(),
            url: location.url.clone(),
            checksum: stored.checksum.clone(),
            owner_id: descriptor.owner_id,
            tags: descriptor.tags,
            is_public: descriptor.is_public,
        };

        let record = match self.records.insert(&new_record).await {
            Ok(record) => record,
            Err(err) => {
                warn!(%id, backend = %backend, error = %err, "registering upload failed, removing stored bytes");
                if let Err(cleanup) = self.orchestrator.delete_from(backend, &key).await {
                    warn!(%id, error = %cleanup, "could not remove bytes of failed upload");
                }
                if let Err(cleanup) = self.records.remove_unregistered(id).await {
                    warn!(%id, error = %cleanup, "could not remove unregistered row");
                }
                return Err(err);
            }
        };

        info!(
            %id,
            backend = %backend,
            size = stored.size,
            checksum = %stored.checksum,
            "upload complete"
        );

        Ok(UploadReceipt {
            id,
            backend,
            checksum: stored.checksum,
            url: location.url,
            record,
        })
    }

    /// Live record for `id`, or `RecordNotFound`.
    pub async fn record(&self, id: Uuid) -> StorageResult<FileRecord> {
        self.records
            .get(id)
            .await?
            .ok_or(StorageError::RecordNotFound(id))
    }

    /// Read a file's bytes from the backend its record names, verifying them
    /// against the recorded checksum.
    pub async fn retrieve(&self, id: Uuid) -> StorageResult<RetrievedObject> {
        let _guard = self.locks.read(id).await;
        let record = self.record(id).await?;
        let mut object = self
            .orchestrator
            .retrieve_from(record.storage_kind, &record.object_key())
            .await?;

        if let Some(expected) = record.checksum.as_deref() {
            verify_checksum(id, &object.content, expected)?;
        }

        object.filename = record.original_name;
        object.content_type = record.content_type;
        Ok(object)
    }

    /// Backend-reported metadata for a live file, `None` if its bytes are
    /// missing from the backend its record names.
    pub async fn metadata(&self, id: Uuid) -> StorageResult<Option<ObjectMetadata>> {
        let _guard = self.locks.read(id).await;
        let record = self.record(id).await?;
        self.orchestrator
            .metadata_in(record.storage_kind, &record.object_key())
            .await
    }

    /// Whether a live record exists and its backend still holds the bytes.
    pub async fn exists(&self, id: Uuid) -> StorageResult<bool> {
        let _guard = self.locks.read(id).await;
        let Some(record) = self.records.get(id).await? else {
            return Ok(false);
        };
        self.orchestrator
            .exists_in(record.storage_kind, &record.object_key())
            .await
    }

    /// Flag the record deleted and keep the bytes.
    pub async fn soft_delete(&self, id: Uuid) -> StorageResult<()> {
        let _guard = self.locks.write(id).await;
        if !self.records.soft_delete(id).await? {
            return Err(StorageError::RecordNotFound(id));
        }
        info!(%id, "soft-deleted file");
        Ok(())
    }

    /// Remove the bytes from their backend and clear the record's checksum.
    ///
    /// Works on soft-deleted records too. A second call reports not-found.
    pub async fn hard_delete(&self, id: Uuid) -> StorageResult<DeletedObject> {
        let _guard = self.locks.write(id).await;
        let record = self
            .records
            .get_any(id)
            .await?
            .filter(|record| !(record.is_deleted && record.checksum.is_none()))
            .ok_or(StorageError::RecordNotFound(id))?;

        match self
            .orchestrator
            .delete_from(record.storage_kind, &record.object_key())
            .await
        {
            Ok(deleted) => {
                self.records.mark_purged(id).await?;
                info!(%id, backend = %record.storage_kind, freed_bytes = deleted.freed_bytes, "hard-deleted file");
                Ok(deleted)
            }
            Err(err) if err.is_not_found() => {
                // Record pointed at bytes that are already gone.
                warn!(%id, backend = %record.storage_kind, "bytes missing on hard delete");
                self.records.mark_purged(id).await?;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }
}
