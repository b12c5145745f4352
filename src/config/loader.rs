//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::{ProxyConfig, StoreBackend};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration: optional TOML file, then process environment, then validation.
pub fn load_config(path: Option<&Path>) -> Result<ProxyConfig, ConfigError> {
    let mut config = match path {
        Some(path) => load_file(path)?,
        None => ProxyConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Parse a TOML configuration file without validating it.
pub fn load_file(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Apply environment overrides using `lookup` to resolve variables.
///
/// Unparseable numeric or boolean values leave the current setting untouched.
pub fn apply_env_overrides<F>(config: &mut ProxyConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = lookup("PORT") {
        config.listener.bind_address = format!("0.0.0.0:{}", port.trim());
    }
    if let Some(v) = lookup("TARGET_URL") {
        config.upstream.target_url = v;
    }
    if let Some(v) = lookup("REDIS_ADDR") {
        config.store.address = v;
    }
    if let Some(v) = lookup("REDIS_PASSWORD") {
        config.store.password = v;
    }
    if let Some(v) = lookup("STORE_BACKEND") {
        match v.trim().to_ascii_lowercase().as_str() {
            "memory" => config.store.backend = StoreBackend::Memory,
            "redis" => config.store.backend = StoreBackend::Redis,
            other => tracing::warn!(value = %other, "Ignoring unknown STORE_BACKEND"),
        }
    }
    if let Some(v) = lookup("APP_ENV") {
        config.app_env = v;
    }
    if let Some(v) = lookup("WEBHOOK_URL") {
        config.alert.webhook_url = v;
    }
    if let Some(v) = lookup("CANARY_URL") {
        config.canary.target_url = v;
    }
    if let Some(v) = parse_env(&lookup, "CANARY_WEIGHT") {
        config.canary.weight = v;
    }
    if let Some(v) = lookup("SIMULATE_REGION") {
        let v = v.trim().to_string();
        config.chaos.simulate_region = if v.is_empty() { None } else { Some(v) };
    }
    if let Some(v) = parse_bool_env(&lookup, "SECURITY_FUZZING_ENABLED") {
        config.security.fuzzing_enabled = v;
    }
    if let Some(v) = parse_env(&lookup, "RATE_LIMIT_REQUESTS") {
        config.rate_limit.limit = v;
    }
    if let Some(v) = parse_env(&lookup, "RATE_LIMIT_WINDOW_SECS") {
        config.rate_limit.window_secs = v;
    }
    if let Some(v) = parse_bool_env(&lookup, "METRICS_ENABLED") {
        config.observability.metrics_enabled = v;
    }
    if let Some(v) = lookup("METRICS_ADDRESS") {
        config.observability.metrics_address = v;
    }
    if let Some(v) = lookup("LOG_LEVEL") {
        config.observability.log_level = v;
    }
}

fn parse_env<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparseable environment value");
            None
        }
    }
}

fn parse_bool_env<F>(lookup: &F, key: &str) -> Option<bool>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => {
            tracing::warn!(key, value = %raw, "Ignoring unparseable boolean");
            None
        }
    }
}
