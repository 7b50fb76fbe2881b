//! Maintenance endpoints. Nothing here runs on a schedule.

use crate::{
    errors::AppError,
    handlers::AppState,
    models::{
        backend::BackendKind,
        report::{BackupReport, BatchMigrationReport, CleanupReport, StorageStats},
    },
};
use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
pub struct BackendQuery {
    pub backend: BackendKind,
}

#[derive(Debug, Deserialize)]
pub struct TargetQuery {
    pub target: BackendKind,
}

#[derive(Debug, Deserialize)]
pub struct BackupReq {
    pub backend: BackendKind,
    pub destination: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct SwitchResponse {
    pub previous: BackendKind,
    pub current: BackendKind,
}

/// `GET /admin/stats`
pub async fn stats(State(state): State<AppState>) -> Result<Json<StorageStats>, AppError> {
    Ok(Json(state.files.stats().await?))
}

/// `POST /admin/cleanup?backend=...`
pub async fn cleanup(
    State(state): State<AppState>,
    Query(q): Query<BackendQuery>,
) -> Result<Json<CleanupReport>, AppError> {
    Ok(Json(state.files.cleanup_orphans(q.backend).await?))
}

/// `POST /admin/backup` with `{"backend": "...", "destination": "..."}`
pub async fn backup(
    State(state): State<AppState>,
    Json(req): Json<BackupReq>,
) -> Result<Json<BackupReport>, AppError> {
    Ok(Json(state.files.backup(req.backend, &req.destination).await?))
}

/// `POST /admin/migrate-all?target=...`
pub async fn migrate_all(
    State(state): State<AppState>,
    Query(q): Query<TargetQuery>,
) -> Result<Json<BatchMigrationReport>, AppError> {
    Ok(Json(state.files.migrate_all(q.target).await?))
}

/// `PUT /admin/backend?backend=...`: change where new uploads go.
pub async fn switch_backend(
    State(state): State<AppState>,
    Query(q): Query<BackendQuery>,
) -> Result<Json<SwitchResponse>, AppError> {
    let previous = state.files.orchestrator().switch_provider(q.backend).await?;
    Ok(Json(SwitchResponse {
        previous,
        current: q.backend,
    }))
}
