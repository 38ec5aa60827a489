//! Inbound request extraction.
//!
//! # Responsibilities
//! - Read the body under the configured size limit
//! - Parse it as JSON to find the streaming intent
//! - Strip the API prefix from the path, keeping the rest verbatim
//!
//! # Design Decisions
//! - The raw body bytes are forwarded, never the re-serialized JSON
//! - An empty body is allowed and means "not streaming"
//! - An oversized body is 413 whether or not it declared a length
//! - Path is taken from the raw URI so percent-encoding survives

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use http_body_util::LengthLimitError;
use serde_json::{json, Value};

use crate::hedge::InboundRequest;

/// Inbound request could not be turned into an upstream request.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("request body exceeds {0} bytes")]
    TooLarge(usize),

    #[error("failed to read request body: {0}")]
    Body(#[from] axum::Error),

    #[error("request body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            RequestError::TooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large"),
            RequestError::Body(_) => (StatusCode::BAD_REQUEST, "Failed to read request body"),
            RequestError::Json(_) => (StatusCode::BAD_REQUEST, "Invalid JSON body"),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Read an inbound request accepted beneath `prefix`.
pub async fn read_inbound(
    request: Request<Body>,
    prefix: &str,
    max_body_size: usize,
) -> Result<InboundRequest, RequestError> {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, max_body_size)
        .await
        .map_err(|e| {
            if exceeds_limit(&e) {
                RequestError::TooLarge(max_body_size)
            } else {
                RequestError::Body(e)
            }
        })?;

    let stream = if bytes.iter().all(u8::is_ascii_whitespace) {
        false
    } else {
        let value: Value = serde_json::from_slice(&bytes)?;
        InboundRequest::stream_flag(&value)
    };

    Ok(InboundRequest {
        method: parts.method,
        path: strip_prefix(parts.uri.path(), prefix).to_string(),
        query: parts.uri.query().map(str::to_string),
        headers: parts.headers,
        body: bytes,
        stream,
    })
}

/// Whether a body read failed on the size cap, possibly nested inside
/// errors from the limit layer.
fn exceeds_limit(error: &axum::Error) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(e) = current {
        if e.is::<LengthLimitError>() {
            return true;
        }
        current = e.source();
    }
    false
}

/// Remainder of `path` beneath `prefix`, without the leading slash.
pub fn strip_prefix<'a>(path: &'a str, prefix: &str) -> &'a str {
    path.strip_prefix(prefix)
        .unwrap_or(path)
        .trim_start_matches('/')
}
