//! src/services/database_provider.rs
//!
//! DatabaseProvider: object bytes live in the `content` column of the file
//! record keyed by the object id, next to their checksum. Every write is a
//! single statement, so a failed store changes nothing.

use crate::{
    models::{
        backend::BackendKind,
        object::{
            DeletedObject, ObjectKey, ObjectMetadata, RetrievedObject, StoredObject,
            StoredObjectDescriptor,
        },
        report::{BackendStats, OrphanCandidate, OrphanScan},
    },
    services::{
        error::{StorageError, StorageResult},
        provider::{StorageProvider, compute_checksum, verify_checksum},
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use sqlx::{SqlitePool, sqlite::SqliteConnection};
use std::{collections::HashSet, sync::Arc};
use tracing::{debug, info};
use uuid::Uuid;

/// Status written on rows the database backend owns. Filesystem records keep
/// their own status when a stale copy is added or cleared.
const CLEARED_STATUS_SQL: &str =
    "CASE WHEN storage_kind = 'filesystem' THEN processing_status ELSE 'deleted' END";

#[derive(Clone, Debug)]
pub struct DatabaseProvider {
    db: Arc<SqlitePool>,
}

impl DatabaseProvider {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Null out the payload of one row. Returns the bytes freed, or `None`
    /// when the row held no content.
    async fn clear_content(conn: &mut SqliteConnection, id: Uuid) -> StorageResult<Option<u64>> {
        let size: Option<i64> = sqlx::query_scalar(
            "SELECT LENGTH(content) FROM files WHERE id = ? AND content IS NOT NULL",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        let Some(size) = size else {
            return Ok(None);
        };

        sqlx::query(&format!(
            "UPDATE files
             SET content = NULL,
                 content_checksum = NULL,
                 processing_status = {},
                 updated_at = ?
             WHERE id = ?",
            CLEARED_STATUS_SQL
        ))
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *conn)
        .await?;

        Ok(Some(size.max(0) as u64))
    }

    async fn clear_row(&self, id: Uuid) -> StorageResult<Option<u64>> {
        let mut conn = self.db.acquire().await?;
        Self::clear_content(&mut conn, id).await
    }
}

#[async_trait]
impl StorageProvider for DatabaseProvider {
    fn kind(&self) -> BackendKind {
        BackendKind::Database
    }

    async fn store(
        &self,
        key: &ObjectKey,
        object: &StoredObjectDescriptor,
    ) -> StorageResult<StoredObject> {
        object.validate()?;

        let checksum = compute_checksum(&object.payload);
        let now = Utc::now();

        // Upsert: a registered row (migration target) keeps its metadata and
        // only gains the payload.
        sqlx::query(
            r#"
            INSERT INTO files (
                id, filename, original_name, content_type, extension, size_bytes,
                encoding, content, content_checksum, processing_status,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'stored', ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                content = excluded.content,
                content_checksum = excluded.content_checksum,
                size_bytes = excluded.size_bytes,
                processing_status = CASE
                    WHEN files.storage_kind = 'filesystem' THEN files.processing_status
                    ELSE 'stored'
                END,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key.id)
        .bind(key.file_name())
        .bind(&object.original_name)
        .bind(&object.content_type)
        .bind(&key.extension)
        .bind(object.len() as i64)
        .bind(&object.encoding)
        .bind(object.payload.as_ref())
        .bind(&checksum)
        .bind(now)
        .bind(now)
        .execute(&*self.db)
        .await
        .map_err(|err| StorageError::write_failure(format!("object `{}`: {}", key.id, err)))?;

        info!(
            id = %key.id,
            size = object.len(),
            checksum = %checksum,
            "stored object in database"
        );

        Ok(StoredObject {
            id: key.id,
            backend: BackendKind::Database,
            size: object.len(),
            checksum,
            locator: None,
        })
    }

    async fn retrieve(&self, key: &ObjectKey) -> StorageResult<RetrievedObject> {
        let row: Option<(String, String, Vec<u8>, Option<String>)> = sqlx::query_as(
            "SELECT filename, content_type, content, content_checksum
             FROM files WHERE id = ? AND content IS NOT NULL",
        )
        .bind(key.id)
        .fetch_optional(&*self.db)
        .await?;

        let Some((filename, content_type, content, stored_checksum)) = row else {
            return Err(StorageError::not_found(BackendKind::Database, key.id));
        };

        let checksum = match stored_checksum {
            Some(expected) => verify_checksum(key.id, &content, &expected)?,
            None => compute_checksum(&content),
        };

        debug!(id = %key.id, size = content.len(), "read object from database");

        Ok(RetrievedObject {
            id: key.id,
            backend: BackendKind::Database,
            size: content.len() as u64,
            content: Bytes::from(content),
            checksum,
            filename,
            content_type,
        })
    }

    async fn delete(&self, key: &ObjectKey) -> StorageResult<DeletedObject> {
        let mut tx = self.db.begin().await?;
        let freed = Self::clear_content(&mut tx, key.id).await?;
        tx.commit().await?;

        let Some(freed_bytes) = freed else {
            return Err(StorageError::not_found(BackendKind::Database, key.id));
        };

        info!(id = %key.id, freed_bytes, "cleared object content in database");
        Ok(DeletedObject {
            id: key.id,
            backend: BackendKind::Database,
            freed_bytes,
            removed: 1,
        })
    }

    async fn exists(&self, key: &ObjectKey) -> StorageResult<bool> {
        let found: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM files WHERE id = ? AND content IS NOT NULL)",
        )
        .bind(key.id)
        .fetch_one(&*self.db)
        .await?;
        Ok(found != 0)
    }

    async fn metadata(&self, key: &ObjectKey) -> StorageResult<Option<ObjectMetadata>> {
        let row: Option<(i64, String, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT LENGTH(content), content_type, filename, updated_at
             FROM files WHERE id = ? AND content IS NOT NULL",
        )
        .bind(key.id)
        .fetch_optional(&*self.db)
        .await?;

        Ok(row.map(|(size, content_type, filename, updated_at)| ObjectMetadata {
            size: size.max(0) as u64,
            content_type,
            filename,
            last_modified: Some(updated_at),
        }))
    }

    async fn stats(&self) -> StorageResult<BackendStats> {
        let (count, total): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(LENGTH(content)), 0)
             FROM files WHERE content IS NOT NULL",
        )
        .fetch_one(&*self.db)
        .await?;

        Ok(BackendStats {
            backend: BackendKind::Database,
            object_count: count.max(0) as u64,
            total_bytes: total.max(0) as u64,
        })
    }

    /// Registered rows holding content whose id is not live for this backend
    /// (deleted records, stale copies left behind by migrations), plus
    /// unregistered rows created before the cutoff. Younger unregistered
    /// rows belong to uploads still in flight.
    async fn orphan_candidates(
        &self,
        live_ids: &HashSet<Uuid>,
        leftovers_before: DateTime<Utc>,
    ) -> StorageResult<OrphanScan> {
        let registered: Vec<Uuid> = sqlx::query_scalar(
            "SELECT id FROM files
             WHERE content IS NOT NULL AND storage_kind IS NOT NULL
             ORDER BY created_at",
        )
        .fetch_all(&*self.db)
        .await?;

        let unregistered: Vec<Uuid> = sqlx::query_scalar(
            "SELECT id FROM files
             WHERE storage_kind IS NULL AND created_at < ?
             ORDER BY created_at",
        )
        .bind(leftovers_before)
        .fetch_all(&*self.db)
        .await?;

        let mut scan = OrphanScan {
            scanned: registered.len() + unregistered.len(),
            candidates: Vec::new(),
        };
        scan.candidates.extend(
            registered
                .into_iter()
                .filter(|id| !live_ids.contains(id))
                .map(OrphanCandidate::Object),
        );
        scan.candidates.extend(
            unregistered
                .into_iter()
                .map(|id| OrphanCandidate::Leftover(id.to_string())),
        );

        debug!(
            scanned = scan.scanned,
            candidates = scan.candidates.len(),
            "scanned database for orphans"
        );
        Ok(scan)
    }

    /// Objects lose their content; leftover rows are deleted outright, but
    /// only while still unregistered.
    async fn reclaim(&self, candidate: &OrphanCandidate) -> StorageResult<Option<u64>> {
        let freed = match candidate {
            OrphanCandidate::Object(id) => self.clear_row(*id).await?,
            OrphanCandidate::Leftover(name) => {
                let id: Uuid = name.parse().map_err(|_| {
                    StorageError::validation(format!("`{}` is not an object id", name))
                })?;
                let deleted: Option<Option<i64>> = sqlx::query_scalar(
                    "DELETE FROM files WHERE id = ? AND storage_kind IS NULL
                     RETURNING LENGTH(content)",
                )
                .bind(id)
                .fetch_optional(&*self.db)
                .await?;
                deleted.map(|size| size.unwrap_or(0).max(0) as u64)
            }
        };
        if let Some(bytes) = freed {
            debug!(item = %candidate, bytes, "reclaimed orphan from database");
        }
        Ok(freed)
    }
}
