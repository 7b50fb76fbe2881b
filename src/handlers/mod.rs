//! HTTP handlers. Each one is a thin adapter over `UploadCoordinator`.

pub mod admin_handlers;
pub mod file_handlers;
pub mod health_handlers;

use crate::services::upload_service::UploadCoordinator;
use std::path::PathBuf;

/// Shared router state.
#[derive(Clone, Debug)]
pub struct AppState {
    pub files: UploadCoordinator,
    /// Filesystem storage root, probed by `/readyz`.
    pub storage_dir: PathBuf,
}

impl AppState {
    pub fn new(files: UploadCoordinator, storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            files,
            storage_dir: storage_dir.into(),
        }
    }
}
