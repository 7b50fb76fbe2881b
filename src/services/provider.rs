//! The contract every storage backend implements.

use crate::{
    models::{
        backend::BackendKind,
        object::{
            DeletedObject, ObjectKey, ObjectMetadata, RetrievedObject, StoredObject,
            StoredObjectDescriptor,
        },
        report::{BackendStats, BackupReport, OrphanCandidate, OrphanScan},
    },
    services::error::{StorageError, StorageResult},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::{collections::HashSet, fmt::Debug, path::Path};
use uuid::Uuid;

/// Uniform store/retrieve/delete surface over a physical medium.
///
/// Expected misses (unknown id, checksum mismatch) and unexpected faults
/// (I/O, SQL) both come back as `Err(StorageError)`; implementations must not
/// panic on either.
#[async_trait]
pub trait StorageProvider: Send + Sync + Debug {
    /// Which backend this is.
    fn kind(&self) -> BackendKind;

    /// Persist `object` under `key`.
    ///
    /// Must be safe to retry: a failed store leaves no partial bytes behind.
    /// The returned checksum covers exactly the bytes written.
    async fn store(
        &self,
        key: &ObjectKey,
        object: &StoredObjectDescriptor,
    ) -> StorageResult<StoredObject>;

    /// Read the full payload. Fails with `NotFound` when nothing is stored.
    async fn retrieve(&self, key: &ObjectKey) -> StorageResult<RetrievedObject>;

    /// Remove the bytes and report how much space was freed.
    async fn delete(&self, key: &ObjectKey) -> StorageResult<DeletedObject>;

    /// Existence check without transferring bytes.
    async fn exists(&self, key: &ObjectKey) -> StorageResult<bool>;

    /// Size, type, name and modification time, or `None` if absent.
    async fn metadata(&self, key: &ObjectKey) -> StorageResult<Option<ObjectMetadata>>;

    /// Object count and total bytes for the whole backend.
    async fn stats(&self) -> StorageResult<BackendStats>;

    /// List what no id in `live_ids` owns, without removing anything.
    ///
    /// `live_ids` holds the registered, non-deleted ids stored in this
    /// backend. Temp files and unregistered rows are only listed when they
    /// predate `leftovers_before`; younger ones may belong to an upload in
    /// flight.
    async fn orphan_candidates(
        &self,
        live_ids: &HashSet<Uuid>,
        leftovers_before: DateTime<Utc>,
    ) -> StorageResult<OrphanScan>;

    /// Remove one candidate. Returns the bytes freed, or `None` if it was
    /// already gone.
    async fn reclaim(&self, candidate: &OrphanCandidate) -> StorageResult<Option<u64>>;

    /// Copy every stored object into `destination`.
    async fn backup(&self, destination: &Path) -> StorageResult<BackupReport> {
        let _ = destination;
        Err(StorageError::unsupported(self.kind(), "backup"))
    }
}

/// Lowercase hex SHA-256 of `data`.
pub fn compute_checksum(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Fail with `Corruption` unless `data` hashes to `expected`.
pub fn verify_checksum(id: Uuid, data: &[u8], expected: &str) -> StorageResult<String> {
    let actual = compute_checksum(data);
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(StorageError::Corruption {
            id,
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(actual)
}
