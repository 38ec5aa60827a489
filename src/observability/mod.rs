//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! hedge + http subsystems produce:
//!     → logging.rs (structured tracing events keyed by correlation id)
//!     → metrics.rs (attempt/race counters, race latency histogram)
//!
//! Consumers:
//!     → stdout (pretty or JSON lines)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Every record about one inbound request carries its correlation id
//! - Emission is fire-and-forget; nothing in the request path waits on it
//! - Metrics calls are no-ops until an exporter is installed

pub mod logging;
pub mod metrics;
