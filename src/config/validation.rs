//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (hedge count, prefixes, addresses)
//! - Check the credential can be sent as a header
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::{HeaderName, HeaderValue};
use url::Url;

use crate::config::schema::ProxyConfig;

/// Upper bound on the fan-out per inbound request.
pub const MAX_HEDGE_COUNT: usize = 32;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    match Url::parse(&config.upstream.base_url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => errors.push(ValidationError::new(
            "upstream.base_url",
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new("upstream.base_url", e.to_string())),
    }

    let prefix = &config.upstream.path_prefix;
    if !prefix.starts_with('/') || (prefix.len() > 1 && prefix.ends_with('/')) {
        errors.push(ValidationError::new(
            "upstream.path_prefix",
            "must start with '/' and must not end with '/'",
        ));
    }

    if HeaderName::from_bytes(config.upstream.auth_header.as_bytes()).is_err() {
        errors.push(ValidationError::new(
            "upstream.auth_header",
            format!("'{}' is not a valid header name", config.upstream.auth_header),
        ));
    }

    if config.upstream.api_key.is_empty() {
        errors.push(ValidationError::new(
            "upstream.api_key",
            "must be set (config file or ANTHROPIC_API_KEY)",
        ));
    } else if HeaderValue::from_str(config.upstream.api_key.expose()).is_err() {
        errors.push(ValidationError::new(
            "upstream.api_key",
            "contains characters not allowed in a header value",
        ));
    }

    if config.hedge.count == 0 || config.hedge.count > MAX_HEDGE_COUNT {
        errors.push(ValidationError::new(
            "hedge.count",
            format!("must be between 1 and {}", MAX_HEDGE_COUNT),
        ));
    }

    if config.hedge.attempt_timeout_ms == Some(0) {
        errors.push(ValidationError::new(
            "hedge.attempt_timeout_ms",
            "must be greater than zero when set",
        ));
    }

    if config.limits.max_body_size == 0 {
        errors.push(ValidationError::new("limits.max_body_size", "must be greater than zero"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
