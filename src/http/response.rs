//! Response relay.
//!
//! # Responsibilities
//! - Turn the race outcome into the caller-visible response
//! - Buffered: upstream status, headers minus content-encoding, body
//! - Streaming: pump decoded chunks to the caller in arrival order
//! - Map dispatcher failures to a generic 500
//!
//! # Design Decisions
//! - Error detail stays in server logs; callers get a fixed JSON body
//! - Streaming relays carry the upstream status but no upstream headers
//! - Framing headers are dropped on buffered relays because the body is
//!   re-framed (and already decompressed by the client)

use std::time::Instant;

use axum::body::Body;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::stream::{self, Stream, StreamExt};
use serde_json::json;

use crate::hedge::{AttemptBody, AttemptResult, ByteStream, CorrelationId, HedgeError, RelayError, Utf8ChunkDecoder};
use crate::observability::metrics;

/// Turn a race outcome into the response sent to the caller.
pub fn relay(outcome: Result<AttemptResult, HedgeError>) -> Response {
    match outcome {
        Ok(result) => relay_result(result),
        Err(e) => internal_error(&e),
    }
}

/// Generic failure response. Detail is logged, never returned.
pub fn internal_error(error: &HedgeError) -> Response {
    let failures = error.failures();
    tracing::error!(
        id = %failures.first().map(|f| f.id.to_string()).unwrap_or_default(),
        failures = failures.len(),
        error = %error,
        "Error in proxy"
    );

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal Server Error" })),
    )
        .into_response()
}

fn relay_result(result: AttemptResult) -> Response {
    let AttemptResult {
        id,
        attempt,
        status,
        headers,
        body,
        ..
    } = result;

    match body {
        AttemptBody::Buffered { bytes, .. } => {
            tracing::info!(
                id = %id,
                attempt,
                status = status.as_u16(),
                bytes = bytes.len(),
                "Relayed buffered response"
            );
            let mut response = Response::new(Body::from(bytes));
            *response.status_mut() = status;
            *response.headers_mut() = relayed_headers(&headers);
            response
        }
        AttemptBody::Stream { stream, decoder } => {
            let mut response = Response::new(Body::from_stream(relay_stream(id, stream, decoder)));
            *response.status_mut() = status;
            response
        }
    }
}

/// Upstream headers the caller may see on a buffered relay.
pub fn relayed_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        if *name == header::CONTENT_ENCODING
            || *name == header::CONTENT_LENGTH
            || *name == header::TRANSFER_ENCODING
        {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

struct RelayState {
    id: CorrelationId,
    stream: ByteStream,
    decoder: Utf8ChunkDecoder,
    chunks: u64,
    bytes: u64,
    start: Instant,
    done: bool,
}

impl Drop for RelayState {
    fn drop(&mut self) {
        if !self.done {
            tracing::debug!(
                id = %self.id,
                chunks = self.chunks,
                "Caller went away mid-stream, dropping upstream stream"
            );
        }
    }
}

/// Decode and forward upstream chunks one at a time, in order.
fn relay_stream(
    id: CorrelationId,
    stream: ByteStream,
    decoder: Utf8ChunkDecoder,
) -> impl Stream<Item = Result<String, RelayError>> + Send + 'static {
    let state = RelayState {
        id,
        stream,
        decoder,
        chunks: 0,
        bytes: 0,
        start: Instant::now(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.done {
            return None;
        }
        loop {
            match state.stream.next().await {
                Some(Ok(chunk)) => {
                    state.bytes += chunk.len() as u64;
                    let text = state.decoder.decode(&chunk);
                    if text.is_empty() {
                        continue;
                    }
                    state.chunks += 1;
                    tracing::trace!(id = %state.id, chunk = %text, "Server-Sent Event");
                    metrics::record_relay_chunk();
                    return Some((Ok(text), state));
                }
                Some(Err(source)) => {
                    state.done = true;
                    let err = RelayError {
                        id: state.id,
                        chunks: state.chunks,
                        source,
                    };
                    tracing::error!(id = %state.id, error = %err, "Stream relay aborted");
                    return Some((Err(err), state));
                }
                None => {
                    state.done = true;
                    let tail = state.decoder.finish();
                    tracing::info!(
                        id = %state.id,
                        chunks = state.chunks,
                        bytes = state.bytes,
                        elapsed_ms = state.start.elapsed().as_millis() as u64,
                        "Stream relay completed"
                    );
                    if tail.is_empty() {
                        return None;
                    }
                    return Some((Ok(tail), state));
                }
            }
        }
    })
}
