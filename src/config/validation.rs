//! Configuration validation.
//!
//! Serde handles syntax; this module checks values that parse but cannot
//! work. Every problem is reported, not just the first.

use std::fmt;
use url::Url;

use crate::chaos::regions;
use crate::config::schema::ProxyConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
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

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a loaded configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(message) = check_upstream_url(&config.upstream.target_url) {
        errors.push(ValidationError::new("upstream.target_url", message));
    }

    if config.canary.weight > 100 {
        errors.push(ValidationError::new(
            "canary.weight",
            format!("must be between 0 and 100, got {}", config.canary.weight),
        ));
    }
    if config.canary.weight > 0 && !config.canary.target_url.is_empty() {
        if let Err(message) = check_upstream_url(&config.canary.target_url) {
            errors.push(ValidationError::new("canary.target_url", message));
        }
    }

    if config.rate_limit.enabled {
        if config.rate_limit.limit == 0 {
            errors.push(ValidationError::new("rate_limit.limit", "must be greater than 0"));
        }
        if config.rate_limit.window_secs == 0 {
            errors.push(ValidationError::new("rate_limit.window_secs", "must be greater than 0"));
        }
    }

    if config.security.max_body_size == 0 {
        errors.push(ValidationError::new("security.max_body_size", "must be greater than 0"));
    }
    if config.traffic.capture_limit == 0 {
        errors.push(ValidationError::new("traffic.capture_limit", "must be greater than 0"));
    }
    if config.background.max_tasks == 0 {
        errors.push(ValidationError::new("background.max_tasks", "must be greater than 0"));
    }
    if config.retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be at least 1"));
    }
    if config.store.timeout_ms == 0 {
        errors.push(ValidationError::new("store.timeout_ms", "must be greater than 0"));
    }

    if let Some(region) = &config.chaos.simulate_region {
        if regions::lookup(region).is_none() {
            tracing::warn!(region = %region, "Unknown region, region latency simulation disabled");
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_upstream_url(raw: &str) -> Result<(), String> {
    let url = Url::parse(raw).map_err(|e| format!("invalid URL '{}': {}", raw, e))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme '{}', only http and https upstreams are proxied", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err(format!("URL '{}' has no host", raw));
    }
    Ok(())
}
