//! File records: the metadata rows the storage engine keeps in step with the
//! bytes.

use crate::models::{backend::BackendKind, object::ObjectKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Raw `files` row, minus the payload column.
#[derive(Clone, FromRow, Debug)]
pub struct FileRow {
    pub id: Uuid,
    pub filename: String,
    pub original_name: String,
    pub content_type: String,
    pub extension: String,
    pub size_bytes: i64,
    pub encoding: Option<String>,
    pub storage_kind: Option<String>,
    pub path: Option<String>,
    pub url: Option<String>,
    pub checksum: Option<String>,
    pub processing_status: String,
    pub owner_id: Option<Uuid>,
    pub tags: String,
    pub is_public: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A registered file.
///
/// `storage_kind` names the backend that verifiably holds the bytes. Only
/// filesystem records carry `path` and `url`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FileRecord {
    pub id: Uuid,
    /// Generated name (`<id><extension>`).
    pub filename: String,
    pub original_name: String,
    pub content_type: String,
    pub extension: String,
    pub size_bytes: i64,
    pub encoding: Option<String>,
    pub storage_kind: BackendKind,
    pub path: Option<String>,
    pub url: Option<String>,
    pub checksum: Option<String>,
    pub processing_status: String,
    pub owner_id: Option<Uuid>,
    pub tags: Vec<String>,
    pub is_public: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl FileRecord {
    pub fn object_key(&self) -> ObjectKey {
        ObjectKey::new(self.id, self.extension.clone())
    }
}

impl TryFrom<FileRow> for FileRecord {
    type Error = String;

    fn try_from(row: FileRow) -> Result<Self, Self::Error> {
        let storage_kind = row
            .storage_kind
            .as_deref()
            .ok_or_else(|| format!("file `{}` has no storage kind", row.id))?
            .parse()?;

        Ok(Self {
            id: row.id,
            filename: row.filename,
            original_name: row.original_name,
            content_type: row.content_type,
            extension: row.extension,
            size_bytes: row.size_bytes,
            encoding: row.encoding,
            storage_kind,
            path: row.path,
            url: row.url,
            checksum: row.checksum,
            processing_status: row.processing_status,
            owner_id: row.owner_id,
            tags: split_tags(&row.tags),
            is_public: row.is_public,
            is_deleted: row.is_deleted,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

/// Values written when a file is first registered.
#[derive(Clone, Debug)]
pub struct NewFileRecord {
    pub id: Uuid,
    pub filename: String,
    pub original_name: String,
    pub content_type: String,
    pub extension: String,
    pub size_bytes: i64,
    pub encoding: Option<String>,
    pub storage_kind: BackendKind,
    pub path: Option<String>,
    pub url: Option<String>,
    pub checksum: String,
    pub owner_id: Option<Uuid>,
    pub tags: Vec<String>,
    pub is_public: bool,
}

/// Where an object lives after a store or migration.
#[derive(Clone, Debug, PartialEq)]
pub struct FileLocation {
    pub storage_kind: BackendKind,
    pub path: Option<String>,
    pub url: Option<String>,
    pub checksum: String,
}

/// Caller-side description of an upload.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct UploadDescriptor {
    pub original_name: String,
    pub content_type: String,
    /// Size claimed by the client; checked against the payload when present.
    pub declared_size: Option<u64>,
    pub owner_id: Option<Uuid>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_public: bool,
    pub encoding: Option<String>,
}

pub(crate) fn join_tags(tags: &[String]) -> String {
    tags.iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

pub(crate) fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
