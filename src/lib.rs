//! Latency-hedging reverse proxy.
//!
//! Every inbound request is sent to the upstream N times concurrently; the
//! first attempt to settle is relayed back, either buffered or as a live
//! ordered stream.

pub mod config;
pub mod hedge;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use hedge::HedgeDispatcher;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
