//! HTTP routes of the file store.
//!
//! ## Structure
//! - **File endpoints**
//!   - `POST   /files` — multipart upload into the default backend
//!   - `GET    /files/{id}` — download, checksum verified
//!   - `HEAD   /files/{id}` — headers only
//!   - `DELETE /files/{id}?hard=bool` — soft delete, or remove the bytes too
//!   - `GET    /files/{id}/meta` — the file record
//!   - `POST   /files/{id}/migrate?target=...` — move between backends
//!
//! - **Admin endpoints**
//!   - `GET  /admin/stats`
//!   - `POST /admin/cleanup?backend=...`
//!   - `POST /admin/backup`
//!   - `POST /admin/migrate-all?target=...`
//!   - `PUT  /admin/backend?backend=...` — switch the default backend

use crate::handlers::{
    AppState,
    admin_handlers::{backup, cleanup, migrate_all, stats, switch_backend},
    file_handlers::{
        delete_file, get_file, get_file_record, head_file, migrate_file, upload_file,
    },
    health_handlers::{healthz, readyz},
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};

/// Largest multipart body accepted by `POST /files`.
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // file routes
        .route(
            "/files",
            post(upload_file).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route(
            "/files/{id}",
            get(get_file).head(head_file).delete(delete_file),
        )
        .route("/files/{id}/meta", get(get_file_record))
        .route("/files/{id}/migrate", post(migrate_file))
        // admin routes
        .route("/admin/stats", get(stats))
        .route("/admin/cleanup", post(cleanup))
        .route("/admin/backup", post(backup))
        .route("/admin/migrate-all", post(migrate_all))
        .route("/admin/backend", put(switch_backend))
}
