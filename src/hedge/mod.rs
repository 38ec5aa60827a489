//! Hedged upstream dispatch.
//!
//! # Data Flow
//! ```text
//! InboundRequest
//!     → upstream.rs (build UpstreamRequest: URL, headers minus host, credential)
//!     → dispatcher.rs (spawn N attempts, race them)
//!         → attempt.rs × N (one HTTP round trip each)
//!     → first AttemptResult per RacePolicy
//!     → http/response.rs (relay to caller)
//! ```
//!
//! # Design Decisions
//! - One correlation ID per inbound request, shared by all its attempts
//! - The upstream request is immutable and shared via Arc
//! - Streaming attempts settle on headers, buffered attempts on full body

pub mod attempt;
pub mod decoder;
pub mod dispatcher;
pub mod error;
pub mod upstream;

pub use attempt::{AttemptBody, AttemptExecutor, AttemptResult, ByteStream, HttpAttemptExecutor};
pub use decoder::Utf8ChunkDecoder;
pub use dispatcher::HedgeDispatcher;
pub use error::{AttemptFailure, HedgeError, RelayError, TargetError, TransportError};
pub use upstream::{
    build_upstream_request, forward_headers, CorrelationId, InboundRequest, UpstreamRequest,
    UpstreamTarget,
};
