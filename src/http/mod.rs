//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, handler)
//!     → request.rs (read body, detect streaming intent)
//!     → [hedge subsystem races upstream attempts]
//!     → response.rs (buffered copy or ordered stream relay)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{read_inbound, RequestError};
pub use response::relay;
pub use server::{AppState, HttpServer, ServerError};
