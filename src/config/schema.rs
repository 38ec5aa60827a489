//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Root configuration for the hedging proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// The single upstream API every request is forwarded to.
    pub upstream: UpstreamConfig,

    /// Hedge fan-out settings.
    pub hedge: HedgeConfig,

    /// Inbound request limits.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}

/// Upstream API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base address of the upstream, without a trailing path.
    pub base_url: String,

    /// API version prefix. Inbound requests are accepted beneath it and
    /// forwarded beneath it.
    pub path_prefix: String,

    /// Header carrying the service credential.
    pub auth_header: String,

    /// Service credential injected into every upstream request.
    pub api_key: ApiKey,

    /// Connection establishment timeout in milliseconds.
    pub connect_timeout_ms: Option<u64>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".to_string(),
            path_prefix: "/v1".to_string(),
            auth_header: "x-api-key".to_string(),
            api_key: ApiKey::default(),
            connect_timeout_ms: None,
        }
    }
}

/// Upstream credential. Never printed in full.
#[derive(Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("ApiKey(<unset>)")
        } else {
            f.write_str("ApiKey(<redacted>)")
        }
    }
}

/// How the race between hedge attempts is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RacePolicy {
    /// The first attempt to settle wins, whether it succeeded or failed.
    #[default]
    FirstSettled,
    /// The first successful attempt wins; fails only once every attempt failed.
    FirstSuccess,
}

impl std::str::FromStr for RacePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "first_settled" => Ok(RacePolicy::FirstSettled),
            "first_success" => Ok(RacePolicy::FirstSuccess),
            other => Err(format!("unknown race policy '{}'", other)),
        }
    }
}

/// Hedge fan-out configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HedgeConfig {
    /// Number of identical upstream attempts launched per inbound request.
    pub count: usize,

    /// Race resolution policy.
    pub race_policy: RacePolicy,

    /// Abort the remaining attempts once a winner is chosen.
    /// When false, losers are detached and run to completion.
    pub cancel_losers: bool,

    /// Per-attempt deadline in milliseconds. None means no deadline.
    pub attempt_timeout_ms: Option<u64>,
}

impl HedgeConfig {
    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for HedgeConfig {
    fn default() -> Self {
        Self {
            count: 2,
            race_policy: RacePolicy::FirstSettled,
            cancel_losers: false,
            attempt_timeout_ms: None,
        }
    }
}

/// Inbound request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum inbound body size in bytes.
    pub max_body_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
