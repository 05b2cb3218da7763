//! Builds HTTP responses for asset envelopes: inline images, attachment
//! downloads, and range-aware video delivery.
//!
//! The stored payload is always normalized to a flat byte buffer before any
//! slicing; a naive slice over the encoded stored form would return wrong
//! bytes.

use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};

use crate::{errors::AppError, models::asset::AssetEnvelope};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Disposition {
    /// Rendered in place (images, video).
    Inline,
    /// Downloaded under the original filename (certificates, documents).
    Attachment,
}

/// Serve the whole payload with `Content-Type`, `Content-Length`, `ETag`,
/// and the requested disposition.
pub fn asset_response(
    envelope: &AssetEnvelope,
    disposition: Disposition,
) -> Result<Response, AppError> {
    let data = envelope.flat_bytes()?.into_owned();
    let total = data.len() as u64;
    let mut response = Response::new(Body::from(data));
    *response.status_mut() = StatusCode::OK;
    set_asset_headers(response.headers_mut(), envelope, total, disposition);
    Ok(response)
}

/// Serve a video payload, honouring a `Range: bytes=<start>-<end?>` header
/// with 206/416 semantics. Without a range header the full payload is served
/// with a 200.
pub fn video_response(
    envelope: &AssetEnvelope,
    range: Option<&str>,
) -> Result<Response, AppError> {
    let data = envelope.flat_bytes()?;
    let total = data.len() as u64;

    let Some(range) = range else {
        let mut response = Response::new(Body::from(data.into_owned()));
        *response.status_mut() = StatusCode::OK;
        set_asset_headers(response.headers_mut(), envelope, total, Disposition::Inline);
        response
            .headers_mut()
            .insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        return Ok(response);
    };

    let (start, end) = parse_range(range, total).map_err(AppError::range_not_satisfiable)?;
    let slice = data.as_ref()[start as usize..=end as usize].to_vec();

    let mut response = Response::new(Body::from(slice));
    *response.status_mut() = StatusCode::PARTIAL_CONTENT;
    let headers = response.headers_mut();
    set_asset_headers(headers, envelope, end - start + 1, Disposition::Inline);
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if let Ok(value) = HeaderValue::from_str(&format!("bytes {}-{}/{}", start, end, total)) {
        headers.insert(header::CONTENT_RANGE, value);
    }
    Ok(response)
}

fn set_asset_headers(
    headers: &mut HeaderMap,
    envelope: &AssetEnvelope,
    content_length: u64,
    disposition: Disposition,
) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&envelope.mime_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&content_length.to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );

    let quoted = format!("\"{}\"", envelope.etag);
    if let Ok(value) = HeaderValue::from_str(&quoted) {
        headers.insert(header::ETAG, value);
    }

    let filename = envelope.original_filename.replace('"', "");
    let value = match disposition {
        Disposition::Inline => format!("inline; filename=\"{}\"", filename),
        Disposition::Attachment => format!("attachment; filename=\"{}\"", filename),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
}

/// Parse `bytes=<start>-<end?>` against a payload of `total` bytes. The
/// start is mandatory; the end defaults to the last byte. Anything outside
/// the payload, malformed, or multi-range is unsatisfiable.
fn parse_range(header: &str, total: u64) -> Result<(u64, u64), String> {
    let spec = header
        .trim()
        .strip_prefix("bytes=")
        .ok_or_else(|| format!("unsupported range unit in `{}`", header))?;
    if spec.contains(',') {
        return Err("multiple ranges are not supported".into());
    }
    let (start_raw, end_raw) = spec
        .split_once('-')
        .ok_or_else(|| format!("malformed range `{}`", header))?;

    let start: u64 = start_raw
        .trim()
        .parse()
        .map_err(|_| format!("range start is required in `{}`", header))?;
    let end: u64 = match end_raw.trim() {
        "" => total
            .checked_sub(1)
            .ok_or_else(|| "payload is empty".to_string())?,
        raw => raw
            .parse()
            .map_err(|_| format!("malformed range end in `{}`", header))?,
    };

    if start >= total || end >= total {
        return Err(format!(
            "range {}-{} falls outside a payload of {} bytes",
            start, end, total
        ));
    }
    if end < start {
        return Err(format!("range end {} precedes start {}", end, start));
    }
    Ok((start, end))
}
