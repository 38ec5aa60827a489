//! Configuration loading from disk and the process environment.

use std::fs;
use std::path::Path;

use crate::config::schema::{ApiKey, ProxyConfig, RacePolicy};
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable holding the upstream credential.
pub const ENV_API_KEY: &str = "ANTHROPIC_API_KEY";
/// Environment variable holding the hedge fan-out count.
pub const ENV_HEDGE_COUNT: &str = "HEDGE_COUNT";
/// Environment variable holding the listen port.
pub const ENV_PORT: &str = "PORT";
/// Environment variable overriding the upstream base address.
pub const ENV_BASE_URL: &str = "UPSTREAM_BASE_URL";
/// Environment variable overriding the race policy.
pub const ENV_RACE_POLICY: &str = "HEDGE_RACE_POLICY";

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Env { var: &'static str, message: String },
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Env { var, message } => write!(f, "Invalid {}: {}", var, message),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load configuration from an optional TOML file, apply environment
/// overrides, then validate.
pub fn load_config(path: Option<&Path>) -> Result<ProxyConfig, ConfigError> {
    let config = match path {
        Some(path) => parse_file(path)?,
        None => ProxyConfig::default(),
    };

    let config = apply_env_overrides(config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

fn parse_file(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    toml::from_str(&content).map_err(ConfigError::Parse)
}

/// Apply environment overrides on top of a parsed configuration.
///
/// `lookup` resolves a variable name to its value; blank values are ignored.
pub fn apply_env_overrides<F>(mut config: ProxyConfig, lookup: F) -> Result<ProxyConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    if let Some(key) = get(ENV_API_KEY) {
        config.upstream.api_key = ApiKey::new(key);
    }

    if let Some(count) = get(ENV_HEDGE_COUNT) {
        config.hedge.count = count.parse().map_err(|e: std::num::ParseIntError| ConfigError::Env {
            var: ENV_HEDGE_COUNT,
            message: e.to_string(),
        })?;
    }

    if let Some(port) = get(ENV_PORT) {
        let port: u16 = port.parse().map_err(|e: std::num::ParseIntError| ConfigError::Env {
            var: ENV_PORT,
            message: e.to_string(),
        })?;
        config.listener.bind_address = with_port(&config.listener.bind_address, port);
    }

    if let Some(base_url) = get(ENV_BASE_URL) {
        config.upstream.base_url = base_url;
    }

    if let Some(policy) = get(ENV_RACE_POLICY) {
        config.hedge.race_policy = policy
            .parse::<RacePolicy>()
            .map_err(|message| ConfigError::Env { var: ENV_RACE_POLICY, message })?;
    }

    Ok(config)
}

/// Replace the port of a `host:port` bind address.
fn with_port(bind_address: &str, port: u16) -> String {
    match bind_address.rsplit_once(':') {
        Some((host, _)) => format!("{}:{}", host, port),
        None => format!("0.0.0.0:{}", port),
    }
}
