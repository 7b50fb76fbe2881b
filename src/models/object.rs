//! Objects as the storage providers see them: the payload going in, the key it
//! lives under, and what comes back out.

use crate::models::backend::BackendKind;
use crate::services::error::{StorageError, StorageResult};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const MAX_EXTENSION_LEN: usize = 16;

/// Payload handed to a provider's `store`.
#[derive(Clone, Debug)]
pub struct StoredObjectDescriptor {
    /// Raw bytes to persist.
    pub payload: Bytes,

    /// Filename as supplied by the uploader.
    pub original_name: String,

    /// Declared MIME type.
    pub content_type: String,

    /// Size the uploader claims the payload has.
    pub declared_size: u64,

    /// Optional transfer encoding tag (e.g. `7bit`, `base64`).
    pub encoding: Option<String>,
}

impl StoredObjectDescriptor {
    /// Build a descriptor whose declared size is the payload length.
    pub fn new(
        payload: impl Into<Bytes>,
        original_name: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        let payload = payload.into();
        Self {
            declared_size: payload.len() as u64,
            payload,
            original_name: original_name.into(),
            content_type: content_type.into(),
            encoding: None,
        }
    }

    pub fn with_declared_size(mut self, declared_size: u64) -> Self {
        self.declared_size = declared_size;
        self
    }

    pub fn with_encoding(mut self, encoding: Option<String>) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn len(&self) -> u64 {
        self.payload.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Reject empty payloads, missing names and size mismatches.
    pub fn validate(&self) -> StorageResult<()> {
        if self.payload.is_empty() {
            return Err(StorageError::validation("payload must not be empty"));
        }
        if self.original_name.trim().is_empty() {
            return Err(StorageError::validation("original filename is required"));
        }
        if self.content_type.trim().is_empty() {
            return Err(StorageError::validation("content type is required"));
        }
        if self.declared_size != self.len() {
            return Err(StorageError::validation(format!(
                "declared size {} does not match payload length {}",
                self.declared_size,
                self.len()
            )));
        }
        Ok(())
    }
}

/// Address of an object inside a backend.
///
/// The id is shared by every backend; the extension only matters to the
/// filesystem provider, which names files `<id><extension>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub id: Uuid,
    pub extension: String,
}

impl ObjectKey {
    /// Key with an already-normalized extension (`""` or `.ext`).
    pub fn new(id: Uuid, extension: impl Into<String>) -> Self {
        Self {
            id,
            extension: normalize_extension(&extension.into()),
        }
    }

    /// Key whose extension is taken from an uploaded filename.
    pub fn for_file(id: Uuid, original_name: &str) -> Self {
        let extension = Path::new(original_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        Self::new(id, extension)
    }

    /// On-disk name used by the filesystem provider.
    pub fn file_name(&self) -> String {
        format!("{}{}", self.id, self.extension)
    }
}

/// Lowercase the extension, add the leading dot, and drop anything that could
/// escape the storage root or is implausibly long.
fn normalize_extension(raw: &str) -> String {
    let trimmed = raw.trim().trim_start_matches('.');
    if trimmed.is_empty()
        || trimmed.len() > MAX_EXTENSION_LEN
        || !trimmed.bytes().all(|b| b.is_ascii_alphanumeric())
    {
        return String::new();
    }
    format!(".{}", trimmed.to_ascii_lowercase())
}

/// Successful store.
#[derive(Clone, Debug, Serialize)]
pub struct StoredObject {
    pub id: Uuid,
    pub backend: BackendKind,
    pub size: u64,
    /// Lowercase hex SHA-256 of exactly the bytes written.
    pub checksum: String,
    /// Absolute path for filesystem objects; `None` when the id is the locator.
    pub locator: Option<PathBuf>,
}

/// Bytes plus the essentials needed to serve them.
#[derive(Clone, Debug)]
pub struct RetrievedObject {
    pub id: Uuid,
    pub backend: BackendKind,
    pub content: Bytes,
    /// Checksum of the bytes actually read.
    pub checksum: String,
    pub filename: String,
    pub content_type: String,
    pub size: u64,
}

/// Successful delete.
#[derive(Clone, Debug, Serialize)]
pub struct DeletedObject {
    pub id: Uuid,
    pub backend: BackendKind,
    pub freed_bytes: u64,
    /// Files (or rows) that were cleared.
    pub removed: usize,
}

/// Lightweight description of a stored object.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ObjectMetadata {
    pub size: u64,
    pub content_type: String,
    pub filename: String,
    pub last_modified: Option<DateTime<Utc>>,
}
