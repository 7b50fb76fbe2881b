//! src/services/record_store.rs
//!
//! FileRecords: the metadata rows that describe every stored file. The
//! storage engine is the only writer of `storage_kind`, `path`, `url` and
//! `checksum`; everything else is supplied by the uploader.

use crate::{
    models::{
        backend::BackendKind,
        file::{FileLocation, FileRecord, FileRow, NewFileRecord, join_tags},
        report::RecordCounts,
    },
    services::error::{StorageError, StorageResult},
};
use chrono::Utc;
use sqlx::SqlitePool;
use std::{collections::HashSet, sync::Arc};
use uuid::Uuid;

const RECORD_COLUMNS: &str = "id, filename, original_name, content_type, extension, size_bytes, \
     encoding, storage_kind, path, url, checksum, processing_status, owner_id, tags, \
     is_public, is_deleted, created_at, updated_at, deleted_at";

#[derive(Clone, Debug)]
pub struct FileRecords {
    db: Arc<SqlitePool>,
}

impl FileRecords {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    fn into_record(row: FileRow) -> StorageResult<FileRecord> {
        FileRecord::try_from(row).map_err(StorageError::validation)
    }

    /// Register a file whose bytes are already stored.
    ///
    /// Upserts so a database-backed row created by the provider gains its
    /// metadata without touching the payload columns.
    pub async fn insert(&self, record: &NewFileRecord) -> StorageResult<FileRecord> {
        let now = Utc::now();
        let row = sqlx::query_as::<_, FileRow>(&format!(
            r#"
            INSERT INTO files (
                id, filename, original_name, content_type, extension, size_bytes,
                encoding, storage_kind, path, url, checksum, processing_status,
                owner_id, tags, is_public, is_deleted, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'ready', ?, ?, ?, 0, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                filename = excluded.filename,
                original_name = excluded.original_name,
                content_type = excluded.content_type,
                extension = excluded.extension,
                size_bytes = excluded.size_bytes,
                encoding = excluded.encoding,
                storage_kind = excluded.storage_kind,
                path = excluded.path,
                url = excluded.url,
                checksum = excluded.checksum,
                processing_status = 'ready',
                owner_id = excluded.owner_id,
                tags = excluded.tags,
                is_public = excluded.is_public,
                is_deleted = 0,
                updated_at = excluded.updated_at,
                deleted_at = NULL
            RETURNING {}
            "#,
            RECORD_COLUMNS
        ))
        .bind(record.id)
        .bind(&record.filename)
        .bind(&record.original_name)
        .bind(&record.content_type)
        .bind(&record.extension)
        .bind(record.size_bytes)
        .bind(&record.encoding)
        .bind(record.storage_kind.as_str())
        .bind(&record.path)
        .bind(&record.url)
        .bind(&record.checksum)
        .bind(record.owner_id)
        .bind(join_tags(&record.tags))
        .bind(record.is_public)
        .bind(now)
        .bind(now)
        .fetch_one(&*self.db)
        .await?;

        Self::into_record(row)
    }

    /// Fetch a live (registered, not deleted) record.
    pub async fn get(&self, id: Uuid) -> StorageResult<Option<FileRecord>> {
        self.fetch(id, false).await
    }

    /// Fetch a registered record, deleted or not.
    pub async fn get_any(&self, id: Uuid) -> StorageResult<Option<FileRecord>> {
        self.fetch(id, true).await
    }

    async fn fetch(&self, id: Uuid, include_deleted: bool) -> StorageResult<Option<FileRecord>> {
        let mut sql = format!(
            "SELECT {} FROM files WHERE id = ? AND storage_kind IS NOT NULL",
            RECORD_COLUMNS
        );
        if !include_deleted {
            sql.push_str(" AND is_deleted = 0");
        }

        sqlx::query_as::<_, FileRow>(&sql)
            .bind(id)
            .fetch_optional(&*self.db)
            .await?
            .map(Self::into_record)
            .transpose()
    }

    /// Point a record at the backend that now holds its bytes.
    pub async fn update_location(&self, id: Uuid, location: &FileLocation) -> StorageResult<()> {
        let result = sqlx::query(
            "UPDATE files
             SET storage_kind = ?, path = ?, url = ?, checksum = ?,
                 processing_status = 'ready', updated_at = ?
             WHERE id = ? AND storage_kind IS NOT NULL",
        )
        .bind(location.storage_kind.as_str())
        .bind(&location.path)
        .bind(&location.url)
        .bind(&location.checksum)
        .bind(Utc::now())
        .bind(id)
        .execute(&*self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::validation(format!(
                "file record `{}` is not registered",
                id
            )));
        }
        Ok(())
    }

    /// Flag a record deleted; bytes stay where they are.
    ///
    /// Returns `false` when there was no live record to flag.
    pub async fn soft_delete(&self, id: Uuid) -> StorageResult<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE files SET is_deleted = 1, deleted_at = ?, updated_at = ?
             WHERE id = ? AND is_deleted = 0 AND storage_kind IS NOT NULL",
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&*self.db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record that the bytes are gone: flag deleted and forget the checksum
    /// and locator.
    pub async fn mark_purged(&self, id: Uuid) -> StorageResult<()> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE files
             SET is_deleted = 1, checksum = NULL, path = NULL, url = NULL,
                 processing_status = 'deleted',
                 deleted_at = COALESCE(deleted_at, ?), updated_at = ?
             WHERE id = ?",
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    /// Drop a row that was never registered (a store whose metadata write
    /// failed).
    pub async fn remove_unregistered(&self, id: Uuid) -> StorageResult<()> {
        sqlx::query("DELETE FROM files WHERE id = ? AND storage_kind IS NULL")
            .bind(id)
            .execute(&*self.db)
            .await?;
        Ok(())
    }

    /// Ids of live records, optionally limited to one backend.
    pub async fn live_ids(&self, kind: Option<BackendKind>) -> StorageResult<HashSet<Uuid>> {
        let ids: Vec<Uuid> = match kind {
            Some(kind) => {
                sqlx::query_scalar(
                    "SELECT id FROM files WHERE is_deleted = 0 AND storage_kind = ?",
                )
                .bind(kind.as_str())
                .fetch_all(&*self.db)
                .await?
            }
            None => {
                sqlx::query_scalar(
                    "SELECT id FROM files WHERE is_deleted = 0 AND storage_kind IS NOT NULL",
                )
                .fetch_all(&*self.db)
                .await?
            }
        };
        Ok(ids.into_iter().collect())
    }

    /// Live ids stored in `kind`, oldest first.
    pub async fn list_ids_by_kind(&self, kind: BackendKind) -> StorageResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar(
            "SELECT id FROM files WHERE is_deleted = 0 AND storage_kind = ?
             ORDER BY created_at ASC",
        )
        .bind(kind.as_str())
        .fetch_all(&*self.db)
        .await?;
        Ok(ids)
    }

    pub async fn count_by_kind(&self) -> StorageResult<RecordCounts> {
        let rows: Vec<(Option<String>, bool, i64)> = sqlx::query_as(
            "SELECT storage_kind, is_deleted, COUNT(*) FROM files
             WHERE storage_kind IS NOT NULL
             GROUP BY storage_kind, is_deleted",
        )
        .fetch_all(&*self.db)
        .await?;

        let mut counts = RecordCounts::default();
        for (kind, is_deleted, count) in rows {
            let count = count.max(0) as u64;
            if is_deleted {
                counts.deleted += count;
                continue;
            }
            match kind.as_deref().map(str::parse::<BackendKind>) {
                Some(Ok(BackendKind::Filesystem)) => counts.filesystem += count,
                Some(Ok(BackendKind::Database)) => counts.database += count,
                _ => {}
            }
        }
        Ok(counts)
    }
}
