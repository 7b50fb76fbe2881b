//! Backend kinds known to the storage engine.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Physical medium holding an object's bytes.
///
/// Stored as lowercase text in the `storage_kind` column of a file record.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Flat directory of `<id><extension>` files.
    #[default]
    Filesystem,
    /// Binary column on the owning file record.
    Database,
}

impl BackendKind {
    pub const ALL: [BackendKind; 2] = [BackendKind::Filesystem, BackendKind::Database];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Filesystem => "filesystem",
            BackendKind::Database => "database",
        }
    }

    /// Map the legacy `use_database` toggle onto a backend kind.
    pub fn from_use_database(use_database: bool) -> Self {
        if use_database {
            BackendKind::Database
        } else {
            BackendKind::Filesystem
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "filesystem" | "fs" | "local" => Ok(BackendKind::Filesystem),
            "database" | "db" => Ok(BackendKind::Database),
            other => Err(format!("unknown storage backend `{}`", other)),
        }
    }
}
