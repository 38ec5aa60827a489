//! Upstream request construction.
//!
//! Turns one inbound request into the immutable description that every
//! hedge attempt sends. No I/O happens here.

use std::fmt;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method};
use bytes::Bytes;
use serde_json::Value;
use uuid::Uuid;

use crate::config::UpstreamConfig;
use crate::hedge::error::TargetError;

/// Identifier shared by every attempt of one inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a new random correlation ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// An inbound request as received from the caller.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    /// Path beneath the API prefix, without a leading slash.
    pub path: String,
    /// Raw query string, if any.
    pub query: Option<String>,
    pub headers: HeaderMap,
    /// Raw body bytes, forwarded verbatim.
    pub body: Bytes,
    /// Whether the body asked for a streamed response.
    pub stream: bool,
}

impl InboundRequest {
    /// Read the streaming intent from a parsed JSON body.
    ///
    /// Only a boolean `stream` field counts; anything else means buffered.
    pub fn stream_flag(body: &Value) -> bool {
        body.get("stream").and_then(Value::as_bool).unwrap_or(false)
    }
}

/// Fixed upstream parameters resolved once at startup.
#[derive(Debug, Clone)]
pub struct UpstreamTarget {
    base_url: String,
    path_prefix: String,
    auth_header: HeaderName,
    auth_value: HeaderValue,
}

impl UpstreamTarget {
    pub fn new(
        base_url: &str,
        path_prefix: &str,
        auth_header: &str,
        api_key: &str,
    ) -> Result<Self, TargetError> {
        let auth_header = HeaderName::from_bytes(auth_header.as_bytes())
            .map_err(|_| TargetError::HeaderName(auth_header.to_string()))?;
        let mut auth_value = HeaderValue::from_str(api_key).map_err(|_| TargetError::Credential)?;
        auth_value.set_sensitive(true);

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            path_prefix: path_prefix.trim_end_matches('/').to_string(),
            auth_header,
            auth_value,
        })
    }

    pub fn from_config(config: &UpstreamConfig) -> Result<Self, TargetError> {
        Self::new(
            &config.base_url,
            &config.path_prefix,
            &config.auth_header,
            config.api_key.expose(),
        )
    }

    pub fn path_prefix(&self) -> &str {
        &self.path_prefix
    }

    pub fn auth_header(&self) -> &HeaderName {
        &self.auth_header
    }

    /// Join the base address, API prefix, path and query.
    pub fn url_for(&self, path: &str, query: Option<&str>) -> String {
        let mut url = format!(
            "{}{}/{}",
            self.base_url,
            self.path_prefix,
            path.trim_start_matches('/')
        );
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }
        url
    }
}

/// One outbound request description, shared read-only by all attempts.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub id: CorrelationId,
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub stream: bool,
}

/// Copy inbound headers for the upstream: drop `host`, then set the
/// credential header, replacing any value the caller sent.
pub fn forward_headers(inbound: &HeaderMap, auth_header: &HeaderName, auth_value: &HeaderValue) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len() + 1);
    for (name, value) in inbound {
        if *name == header::HOST || name == auth_header {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers.insert(auth_header.clone(), auth_value.clone());
    headers
}

/// Build the upstream request for one inbound request.
pub fn build_upstream_request(
    inbound: &InboundRequest,
    target: &UpstreamTarget,
    id: CorrelationId,
) -> UpstreamRequest {
    UpstreamRequest {
        id,
        method: inbound.method.clone(),
        url: target.url_for(&inbound.path, inbound.query.as_deref()),
        headers: forward_headers(&inbound.headers, &target.auth_header, &target.auth_value),
        body: inbound.body.clone(),
        stream: inbound.stream,
    }
}
