use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::models::FieldError;
use crate::models::asset::AssetError;
use crate::services::batch_store::StoreError;

/// A lightweight wrapper for request failures: an HTTP status, a
/// machine-stable error kind, and a human message. Storage internals never
/// leak outward; they are logged server-side and replaced with a generic
/// message here.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, kind: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_argument", msg)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "conflict", msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", msg)
    }

    pub fn payload_too_large(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", msg)
    }

    pub fn range_not_satisfiable(msg: impl Into<String>) -> Self {
        Self::new(
            StatusCode::RANGE_NOT_SATISFIABLE,
            "range_not_satisfiable",
            msg,
        )
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "storage_failure", msg)
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
            "success": false,
            "error": self.kind,
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidBatchKey { .. } | StoreError::Invalid(_) => {
                AppError::bad_request(err.to_string())
            }
            StoreError::BatchAlreadyExists(_) | StoreError::DuplicateChild(_) => {
                AppError::conflict(err.to_string())
            }
            StoreError::BatchNotFound(_) | StoreError::ChildNotFound => {
                AppError::not_found(err.to_string())
            }
            StoreError::Contention(ref key) => {
                tracing::warn!(batch = %key, "mutation retries exhausted");
                AppError::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "storage_failure",
                    "batch is being modified concurrently, please retry",
                )
            }
            StoreError::Sqlx(_) | StoreError::Doc(_) => {
                tracing::error!(error = %err, "storage failure");
                AppError::internal("storage error")
            }
        }
    }
}

impl From<FieldError> for AppError {
    fn from(err: FieldError) -> Self {
        AppError::bad_request(err.0)
    }
}

impl From<AssetError> for AppError {
    fn from(err: AssetError) -> Self {
        match err {
            AssetError::TooLarge { .. } => AppError::payload_too_large(err.to_string()),
            AssetError::CorruptEncoding => {
                tracing::error!(error = %err, "stored asset could not be decoded");
                AppError::internal("storage error")
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %err, "unhandled internal error");
        AppError::internal("internal error")
    }
}
