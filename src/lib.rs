//! Dual-backend file storage: bytes live either on the local filesystem or
//! inside SQLite, with a metadata record tracking which.

pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;

pub use models::backend::BackendKind;
pub use services::{
    error::{StorageError, StorageResult},
    orchestrator::StorageOrchestrator,
    provider::StorageProvider,
    record_store::FileRecords,
    upload_service::UploadCoordinator,
};

use axum::Router;
use handlers::AppState;

/// Router with state attached, ready to serve.
pub fn app(state: AppState) -> Router {
    routes::routes::routes().with_state(state)
}
