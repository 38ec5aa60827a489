//! Error taxonomy for hedged upstream calls.
//!
//! Upstream non-2xx responses are not errors here: a response was
//! received, so it settles the race and is relayed as-is.

use std::time::Duration;

use crate::hedge::upstream::CorrelationId;

/// Why a single attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum AttemptFailure {
    /// Connect, send, receive-headers or receive-body failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The per-attempt deadline passed before the attempt settled.
    #[error("attempt timed out after {0:?}")]
    TimedOut(Duration),

    /// The attempt task panicked or was aborted.
    #[error("attempt task failed: {0}")]
    Task(String),
}

/// A failed hedge attempt.
#[derive(Debug, thiserror::Error)]
#[error("attempt {attempt} of request {id} failed after {elapsed:?}: {source}")]
pub struct TransportError {
    pub id: CorrelationId,
    pub attempt: usize,
    pub elapsed: Duration,
    #[source]
    pub source: AttemptFailure,
}

/// Outcome of a race that did not produce a response.
#[derive(Debug, thiserror::Error)]
pub enum HedgeError {
    /// The first attempt to settle was a failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Every attempt failed before any produced a response.
    #[error("all {} hedge attempts failed", .0.len())]
    Exhausted(Vec<TransportError>),
}

impl HedgeError {
    /// Every attempt failure carried by this error.
    pub fn failures(&self) -> Vec<&TransportError> {
        match self {
            HedgeError::Transport(e) => vec![e],
            HedgeError::Exhausted(errors) => errors.iter().collect(),
        }
    }
}

/// Failure while pumping the winning stream to the caller.
#[derive(Debug, thiserror::Error)]
#[error("stream relay for request {id} aborted after {chunks} chunks: {source}")]
pub struct RelayError {
    pub id: CorrelationId,
    pub chunks: u64,
    #[source]
    pub source: reqwest::Error,
}

/// Invalid fixed upstream parameters.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("'{0}' is not a valid header name")]
    HeaderName(String),

    #[error("credential is not a valid header value")]
    Credential,
}
