//! Moving objects between backends.
//!
//! Order of operations for one object:
//! 1. no-op if the record already names the target backend
//! 2. read from the source and verify against the recorded checksum
//! 3. store into the target under the same id and compare checksums
//! 4. delete the source copy (failure leaves a reclaimable stale copy)
//! 5. repoint the record
//!
//! The record only changes in step 5, so until then it still names a backend
//! that verifiably holds the bytes. The object's lock is held exclusively
//! across all five steps: readers wait instead of seeing the gap between 4
//! and 5, and cleanup cannot reclaim the target copy before the record
//! points at it. Backends are passed explicitly; nothing shared is switched
//! while a migration runs.

use crate::{
    models::{
        backend::BackendKind,
        object::{ObjectKey, StoredObjectDescriptor},
        report::{BatchMigrationReport, ItemFailure, MigrationReport},
    },
    services::{
        error::{StorageError, StorageResult},
        provider::verify_checksum,
        upload_service::UploadCoordinator,
    },
};
use tracing::{error, info, warn};
use uuid::Uuid;

impl UploadCoordinator {
    /// Relocate one object's bytes to `target`.
    ///
    /// On error the object is still readable from the backend its record
    /// names.
    pub async fn migrate(&self, id: Uuid, target: BackendKind) -> StorageResult<MigrationReport> {
        let _guard = self.locks.write(id).await;
        let record = self.record(id).await?;
        let source = record.storage_kind;

        if source == target {
            info!(%id, backend = %target, "object already in target backend");
            return Ok(MigrationReport {
                id,
                from: source,
                to: target,
                migrated: false,
                size: record.size_bytes.max(0) as u64,
                checksum: record.checksum,
                stale_copy_error: None,
            });
        }

        // Both ends must exist before anything is touched.
        self.orchestrator.provider(source)?;
        self.orchestrator.provider(target)?;
        let key = record.object_key();

        let object = self.orchestrator.retrieve_from(source, &key).await?;
        let checksum = match record.checksum.as_deref() {
            Some(expected) => verify_checksum(id, &object.content, expected)?,
            None => object.checksum.clone(),
        };

        let descriptor = StoredObjectDescriptor::new(
            object.content.clone(),
            record.original_name.clone(),
            record.content_type.clone(),
        )
        .with_encoding(record.encoding.clone());

        let stored = match self.orchestrator.store_in(target, &key, &descriptor).await {
            Ok(stored) => stored,
            Err(err) => {
                error!(%id, from = %source, to = %target, error = %err, "migration aborted: store into target failed");
                return Err(err);
            }
        };

        if stored.checksum != checksum {
            error!(%id, to = %target, "migration aborted: target checksum mismatch");
            self.discard_copy(target, &key).await;
            return Err(StorageError::Corruption {
                id,
                expected: checksum,
                actual: stored.checksum,
            });
        }

        let stale_copy_error = match self.orchestrator.delete_from(source, &key).await {
            Ok(_) => None,
            Err(err) => {
                warn!(%id, backend = %source, error = %err, "could not remove source copy after migration");
                Some(err.to_string())
            }
        };

        let location = self.location_for(target, &key, &stored);
        if let Err(err) = self.records.update_location(id, &location).await {
            error!(%id, from = %source, to = %target, error = %err, "migration aborted: record update failed");
            if stale_copy_error.is_none() {
                // The source copy is gone; put it back before dropping the new one.
                if let Err(restore) = self.orchestrator.store_in(source, &key, &descriptor).await {
                    error!(%id, backend = %source, error = %restore, "could not restore source copy");
                    return Err(err);
                }
            }
            self.discard_copy(target, &key).await;
            return Err(err);
        }

        info!(
            %id,
            from = %source,
            to = %target,
            size = stored.size,
            checksum = %stored.checksum,
            "migrated object"
        );

        Ok(MigrationReport {
            id,
            from: source,
            to: target,
            migrated: true,
            size: stored.size,
            checksum: Some(stored.checksum),
            stale_copy_error,
        })
    }

    /// Migrate every live object that is not already in `target`.
    ///
    /// Objects are processed one at a time; a failure is recorded and the
    /// batch continues.
    pub async fn migrate_all(&self, target: BackendKind) -> StorageResult<BatchMigrationReport> {
        self.orchestrator.provider(target)?;

        let mut report = BatchMigrationReport {
            target,
            migrated: Vec::new(),
            failures: Vec::new(),
            stale_copies: Vec::new(),
        };

        for source in self.orchestrator.backends() {
            if source == target {
                continue;
            }
            for id in self.records.list_ids_by_kind(source).await? {
                match self.migrate(id, target).await {
                    Ok(outcome) => {
                        if let Some(stale) = outcome.stale_copy_error {
                            report.stale_copies.push(ItemFailure::new(id.to_string(), stale));
                        }
                        if outcome.migrated {
                            report.migrated.push(id);
                        }
                    }
                    Err(err) => report.failures.push(ItemFailure::new(id.to_string(), err)),
                }
            }
        }

        info!(
            target = %target,
            migrated = report.migrated.len(),
            failures = report.failures.len(),
            stale_copies = report.stale_copies.len(),
            "batch migration finished"
        );
        Ok(report)
    }

    /// Best-effort removal of a copy the record does not point at.
    async fn discard_copy(&self, kind: BackendKind, key: &ObjectKey) {
        if let Err(err) = self.orchestrator.delete_from(kind, key).await {
            warn!(id = %key.id, backend = %kind, error = %err, "could not discard copy");
        }
    }
}
