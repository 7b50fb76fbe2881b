//! Error taxonomy shared by every provider and workflow.

use crate::models::backend::BackendKind;
use std::io;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object `{id}` not found in {backend} storage")]
    NotFound { backend: BackendKind, id: Uuid },
    #[error("file `{0}` not found")]
    RecordNotFound(Uuid),
    #[error("object `{id}` is corrupted: expected checksum {expected}, got {actual}")]
    Corruption {
        id: Uuid,
        expected: String,
        actual: String,
    },
    #[error("write failed: {0}")]
    WriteFailure(String),
    #[error("{operation} is not supported by {backend} storage")]
    Unsupported {
        backend: BackendKind,
        operation: &'static str,
    },
    #[error("invalid request: {0}")]
    Validation(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    pub fn not_found(backend: BackendKind, id: Uuid) -> Self {
        StorageError::NotFound { backend, id }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        StorageError::Validation(msg.into())
    }

    pub fn write_failure(msg: impl Into<String>) -> Self {
        StorageError::WriteFailure(msg.into())
    }

    pub fn unsupported(backend: BackendKind, operation: &'static str) -> Self {
        StorageError::Unsupported { backend, operation }
    }

    /// Machine-readable reason code surfaced to callers.
    pub fn reason(&self) -> &'static str {
        match self {
            StorageError::NotFound { .. } | StorageError::RecordNotFound(_) => "not_found",
            StorageError::Corruption { .. } => "corruption",
            StorageError::WriteFailure(_) => "write_failure",
            StorageError::Unsupported { .. } => "unsupported",
            StorageError::Validation(_) => "validation",
            StorageError::Sqlx(_) => "database",
            StorageError::Io(_) => "io",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::NotFound { .. } | StorageError::RecordNotFound(_)
        )
    }

    pub fn is_corruption(&self) -> bool {
        matches!(self, StorageError::Corruption { .. })
    }
}
