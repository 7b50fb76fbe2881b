//! Results of the maintenance workflows. Tolerated per-item failures are
//! carried here instead of being logged and forgotten.

use crate::models::backend::BackendKind;
use serde::Serialize;
use std::{fmt, path::PathBuf};
use uuid::Uuid;

/// Aggregate size of one backend.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct BackendStats {
    pub backend: BackendKind,
    pub object_count: u64,
    pub total_bytes: u64,
}

/// A single item that could not be processed in a batch.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ItemFailure {
    pub item: String,
    pub error: String,
}

impl ItemFailure {
    pub fn new(item: impl Into<String>, error: impl ToString) -> Self {
        Self {
            item: item.into(),
            error: error.to_string(),
        }
    }
}

/// Something a backend holds that no live record in that backend claims.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum OrphanCandidate {
    /// Bytes filed under an object id. The id may be claimed again by the
    /// time cleanup gets to it, so it is re-checked under the object's lock.
    Object(Uuid),
    /// Bytes not tied to a registered object: stray file names, and temp
    /// files or unregistered rows old enough to be crash leftovers.
    Leftover(String),
}

impl fmt::Display for OrphanCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object(id) => write!(f, "{}", id),
            Self::Leftover(name) => f.write_str(name),
        }
    }
}

/// Result of scanning one backend for orphans.
#[derive(Clone, Debug, Default)]
pub struct OrphanScan {
    pub scanned: usize,
    pub candidates: Vec<OrphanCandidate>,
}

#[derive(Serialize, Clone, Debug)]
pub struct CleanupReport {
    pub backend: BackendKind,
    /// Items examined (files on disk, or rows holding content).
    pub scanned: usize,
    pub reclaimed: usize,
    pub bytes_freed: u64,
    pub failures: Vec<ItemFailure>,
}

impl CleanupReport {
    pub fn new(backend: BackendKind) -> Self {
        Self {
            backend,
            scanned: 0,
            reclaimed: 0,
            bytes_freed: 0,
            failures: Vec::new(),
        }
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct BackupReport {
    pub backend: BackendKind,
    pub destination: PathBuf,
    pub copied: usize,
    pub bytes_copied: u64,
    pub failures: Vec<ItemFailure>,
}

/// Outcome of moving one object between backends.
#[derive(Serialize, Clone, Debug)]
pub struct MigrationReport {
    pub id: Uuid,
    pub from: BackendKind,
    pub to: BackendKind,
    /// `false` when the object already lived in the target backend.
    pub migrated: bool,
    pub size: u64,
    pub checksum: Option<String>,
    /// Set when the old copy could not be removed; the object is still served
    /// from the target and the leftover is reclaimable by cleanup.
    pub stale_copy_error: Option<String>,
}

#[derive(Serialize, Clone, Debug)]
pub struct BatchMigrationReport {
    pub target: BackendKind,
    pub migrated: Vec<Uuid>,
    pub failures: Vec<ItemFailure>,
    pub stale_copies: Vec<ItemFailure>,
}

/// Number of registered records per backend.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordCounts {
    pub filesystem: u64,
    pub database: u64,
    pub deleted: u64,
}

#[derive(Serialize, Clone, Debug)]
pub struct StorageStats {
    pub default_backend: BackendKind,
    pub backends: Vec<BackendStats>,
    pub records: RecordCounts,
}
