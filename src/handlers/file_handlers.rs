//! HTTP handlers for uploading, reading, deleting and migrating files.
//! Storage concerns are delegated to `UploadCoordinator`.

use crate::{
    errors::AppError,
    handlers::AppState,
    models::{backend::BackendKind, file::{FileRecord, UploadDescriptor}},
    services::{error::StorageError, upload_service::UploadReceipt},
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use serde::Deserialize;
use uuid::Uuid;

/// RFC 9530 digest of the full representation.
const REPR_DIGEST: HeaderName = HeaderName::from_static("repr-digest");

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    /// Remove the bytes too, not just flag the record.
    #[serde(default)]
    pub hard: bool,
}

#[derive(Debug, Deserialize)]
pub struct MigrateQuery {
    pub target: BackendKind,
}

/// `POST /files`: multipart upload.
///
/// Fields: `file` (required), `owner_id`, `tags` (comma separated),
/// `public`, `encoding`.
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadReceipt>), AppError> {
    let mut descriptor = UploadDescriptor::default();
    let mut payload: Option<Bytes> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(err.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                descriptor.original_name = field.file_name().unwrap_or_default().to_string();
                descriptor.content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                payload = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|err| AppError::bad_request(err.to_string()))?,
                );
            }
            "owner_id" => {
                let text = text_field(field).await?;
                let owner = text
                    .parse::<Uuid>()
                    .map_err(|_| AppError::bad_request(format!("invalid owner_id `{}`", text)))?;
                descriptor.owner_id = Some(owner);
            }
            "tags" => {
                descriptor.tags = text_field(field)
                    .await?
                    .split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect();
            }
            "public" => {
                descriptor.is_public = matches!(text_field(field).await?.trim(), "1" | "true" | "on");
            }
            "encoding" => descriptor.encoding = Some(text_field(field).await?),
            "size" => {
                let text = text_field(field).await?;
                let size = text
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| AppError::bad_request(format!("invalid size `{}`", text)))?;
                descriptor.declared_size = Some(size);
            }
            _ => {}
        }
    }

    let payload = payload.ok_or_else(|| AppError::bad_request("missing `file` field"))?;
    let receipt = state.files.upload(payload, descriptor).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn text_field(field: axum::extract::multipart::Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|err| AppError::bad_request(err.to_string()))
}

/// `GET /files/{id}`: full payload, verified against its checksum.
pub async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let object = state.files.retrieve(id).await?;

    let mut response = Response::new(Body::empty());
    set_file_headers(
        response.headers_mut(),
        &object.content_type,
        &object.filename,
        object.size,
        Some(&object.checksum),
    );
    *response.body_mut() = Body::from(object.content);
    *response.status_mut() = StatusCode::OK;
    Ok(response)
}

/// `HEAD /files/{id}`: same headers as GET, no body.
pub async fn head_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let record = state.files.record(id).await?;
    if !state.files.exists(id).await? {
        return Err(StorageError::not_found(record.storage_kind, id).into());
    }

    let mut response = Response::new(Body::empty());
    set_file_headers(
        response.headers_mut(),
        &record.content_type,
        &record.original_name,
        record.size_bytes.max(0) as u64,
        record.checksum.as_deref(),
    );
    Ok(response)
}

/// `GET /files/{id}/meta`: the file record.
pub async fn get_file_record(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FileRecord>, AppError> {
    Ok(Json(state.files.record(id).await?))
}

/// `DELETE /files/{id}?hard=true|false`
pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<DeleteQuery>,
) -> Result<Response, AppError> {
    if q.hard {
        let deleted = state.files.hard_delete(id).await?;
        return Ok(Json(deleted).into_response());
    }
    state.files.soft_delete(id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// `POST /files/{id}/migrate?target=database|filesystem`
pub async fn migrate_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<MigrateQuery>,
) -> Result<impl IntoResponse, AppError> {
    let report = state.files.migrate(id, q.target).await?;
    Ok(Json(report))
}

fn set_file_headers(
    headers: &mut HeaderMap,
    content_type: &str,
    filename: &str,
    size: u64,
    checksum: Option<&str>,
) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));

    let safe_name: String = filename
        .chars()
        .map(|c| if c == '"' || c.is_control() { '_' } else { c })
        .collect();
    if let Ok(value) = HeaderValue::from_str(&format!("inline; filename=\"{}\"", safe_name)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    if let Some(checksum) = checksum {
        if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", checksum)) {
            headers.insert(header::ETAG, value);
        }
        if let Ok(raw) = hex::decode(checksum) {
            let digest = format!("sha-256=:{}:", general_purpose::STANDARD.encode(raw));
            if let Ok(value) = HeaderValue::from_str(&digest) {
                headers.insert(REPR_DIGEST, value);
            }
        }
    }
}
