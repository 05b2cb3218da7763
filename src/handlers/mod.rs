//! HTTP handlers: one module per batch family, plus health probes and the
//! shared media-delivery helpers.

use axum::{
    extract::multipart::{Field, MultipartError},
    http::StatusCode,
};

use crate::{errors::AppError, models::asset::AssetEnvelope, state::UploadLimits};

pub mod health_handlers;
pub mod internship_handlers;
pub mod media;
pub mod team_handlers;

pub(crate) fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError::payload_too_large("request body exceeds the upload limit");
    }
    AppError::bad_request(format!("invalid multipart payload: {}", err))
}

/// Read one uploaded file part into an asset envelope, enforcing the
/// per-asset size limit.
pub(crate) async fn read_asset_part(
    field: Field<'_>,
    limits: UploadLimits,
) -> Result<AssetEnvelope, AppError> {
    let filename = field.file_name().unwrap_or("upload.bin").to_string();
    let mime_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    let data = field.bytes().await.map_err(multipart_error)?;
    Ok(AssetEnvelope::from_upload(
        data,
        mime_type,
        filename,
        limits.max_asset_bytes,
    )?)
}

/// A submitted-but-blank optional form field means "clear the value";
/// anything else sets it.
pub(crate) fn clearable(text: String) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
