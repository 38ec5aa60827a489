//! Single upstream attempt.
//!
//! # Responsibilities
//! - Perform exactly one HTTP round trip for an [`UpstreamRequest`]
//! - Streaming: return as soon as headers arrive, body left open
//! - Buffered: read the full body before returning
//! - Log completion or failure with the attempt's timings
//!
//! # Design Decisions
//! - `fetch_time` covers time to headers only, so streaming attempts race on
//!   responsiveness rather than full transfer time
//! - Non-2xx responses are results, not failures
//! - The executor sits behind a trait so the dispatcher can be driven by
//!   scripted attempts in tests

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::{FutureExt, StreamExt};

use crate::hedge::decoder::Utf8ChunkDecoder;
use crate::hedge::error::{AttemptFailure, TransportError};
use crate::hedge::upstream::{CorrelationId, UpstreamRequest};
use crate::observability::metrics;

/// Live upstream body.
pub type ByteStream = BoxStream<'static, Result<Bytes, reqwest::Error>>;

/// Body of a settled attempt.
pub enum AttemptBody {
    /// Headers received; body still arriving.
    Stream {
        stream: ByteStream,
        decoder: Utf8ChunkDecoder,
    },
    /// Body fully read.
    Buffered { bytes: Bytes, total_time: Duration },
}

impl fmt::Debug for AttemptBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptBody::Stream { decoder, .. } => f
                .debug_struct("Stream")
                .field("pending", &decoder.pending_len())
                .finish_non_exhaustive(),
            AttemptBody::Buffered { bytes, total_time } => f
                .debug_struct("Buffered")
                .field("len", &bytes.len())
                .field("total_time", total_time)
                .finish(),
        }
    }
}

/// A response received by one attempt.
#[derive(Debug)]
pub struct AttemptResult {
    pub id: CorrelationId,
    pub attempt: usize,
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Time until response headers arrived.
    pub fetch_time: Duration,
    pub body: AttemptBody,
}

impl AttemptResult {
    pub fn is_streaming(&self) -> bool {
        matches!(self.body, AttemptBody::Stream { .. })
    }
}

/// Performs one upstream round trip.
pub trait AttemptExecutor: Send + Sync + 'static {
    fn execute(
        &self,
        request: Arc<UpstreamRequest>,
        attempt: usize,
    ) -> BoxFuture<'static, Result<AttemptResult, TransportError>>;
}

/// Attempt executor backed by a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpAttemptExecutor {
    client: reqwest::Client,
}

impl HttpAttemptExecutor {
    pub fn new(connect_timeout: Option<Duration>) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl AttemptExecutor for HttpAttemptExecutor {
    fn execute(
        &self,
        request: Arc<UpstreamRequest>,
        attempt: usize,
    ) -> BoxFuture<'static, Result<AttemptResult, TransportError>> {
        run_attempt(self.client.clone(), request, attempt).boxed()
    }
}

async fn run_attempt(
    client: reqwest::Client,
    request: Arc<UpstreamRequest>,
    attempt: usize,
) -> Result<AttemptResult, TransportError> {
    let start = Instant::now();

    let mut builder = client
        .request(request.method.clone(), &request.url)
        .headers(request.headers.clone());
    if !request.body.is_empty() {
        builder = builder.body(request.body.clone());
    }

    let response = builder
        .send()
        .await
        .map_err(|e| failed(&request, attempt, start, e))?;

    let fetch_time = start.elapsed();
    let status = response.status();
    let headers = response.headers().clone();

    let body = if request.stream {
        tracing::info!(
            id = %request.id,
            attempt,
            status = status.as_u16(),
            fetch_time_ms = fetch_time.as_millis() as u64,
            stream = true,
            "Attempt completed"
        );
        AttemptBody::Stream {
            stream: response.bytes_stream().boxed(),
            decoder: Utf8ChunkDecoder::new(),
        }
    } else {
        let bytes = response
            .bytes()
            .await
            .map_err(|e| failed(&request, attempt, start, e))?;
        let total_time = start.elapsed();
        tracing::info!(
            id = %request.id,
            attempt,
            status = status.as_u16(),
            fetch_time_ms = fetch_time.as_millis() as u64,
            total_time_ms = total_time.as_millis() as u64,
            stream = false,
            "Attempt completed"
        );
        AttemptBody::Buffered { bytes, total_time }
    };

    metrics::record_attempt("success");

    Ok(AttemptResult {
        id: request.id,
        attempt,
        status,
        headers,
        fetch_time,
        body,
    })
}

fn failed(request: &UpstreamRequest, attempt: usize, start: Instant, error: reqwest::Error) -> TransportError {
    let elapsed = start.elapsed();
    tracing::error!(
        id = %request.id,
        attempt,
        error = %error,
        error_time_ms = elapsed.as_millis() as u64,
        "Attempt failed"
    );
    metrics::record_attempt("failure");

    TransportError {
        id: request.id,
        attempt,
        elapsed,
        source: AttemptFailure::Transport(error),
    }
}
