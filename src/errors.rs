use crate::services::error::StorageError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    /// Machine-readable reason code (`not_found`, `corruption`, ...).
    pub reason: &'static str,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, reason: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status,
            reason,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation", msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "reason": self.reason,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        let status = match &err {
            StorageError::NotFound { .. } | StorageError::RecordNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            StorageError::Validation(_) => StatusCode::BAD_REQUEST,
            StorageError::Unsupported { .. } => StatusCode::NOT_IMPLEMENTED,
            StorageError::Corruption { .. } => {
                tracing::error!(error = %err, "integrity check failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            StorageError::WriteFailure(_) | StorageError::Sqlx(_) | StorageError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        AppError::new(status, err.reason(), err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}
