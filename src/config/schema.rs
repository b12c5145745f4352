//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits so a TOML file can seed the defaults before
//! environment overrides are applied.

use serde::{Deserialize, Serialize};

/// Root configuration for the chaos proxy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Deployment environment ("development", "production", ...).
    pub app_env: String,

    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Primary backend the proxy fronts.
    pub upstream: UpstreamConfig,

    /// External key-value store settings.
    pub store: StoreConfig,

    /// Weighted canary routing.
    pub canary: CanaryConfig,

    /// Chaos injection settings that are fixed for the process lifetime.
    pub chaos: ChaosConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Traffic capture and publishing.
    pub traffic: TrafficConfig,

    /// Security fuzzing and request size limits.
    pub security: SecurityConfig,

    /// Alert webhook.
    pub alert: AlertConfig,

    /// Detached background work bound.
    pub background: BackgroundConfig,

    /// Retry configuration for transport failures.
    pub retries: RetryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            app_env: "development".to_string(),
            listener: ListenerConfig::default(),
            upstream: UpstreamConfig::default(),
            store: StoreConfig::default(),
            canary: CanaryConfig::default(),
            chaos: ChaosConfig::default(),
            rate_limit: RateLimitConfig::default(),
            traffic: TrafficConfig::default(),
            security: SecurityConfig::default(),
            alert: AlertConfig::default(),
            background: BackgroundConfig::default(),
            retries: RetryConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ProxyConfig {
    /// True when running with production log formatting.
    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Primary backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the primary backend.
    pub target_url: String,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            target_url: "http://httpbin.org".to_string(),
            connect_timeout_secs: 5,
        }
    }
}

/// Which store implementation backs the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Redis,
    Memory,
}

/// External key-value store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// Store address ("host:port" or a full `redis://` URL).
    pub address: String,

    /// Optional password.
    pub password: String,

    /// Per-command timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redis,
            address: "localhost:6379".to_string(),
            password: String::new(),
            timeout_ms: 1000,
        }
    }
}

/// Canary routing configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CanaryConfig {
    /// Secondary backend URL. Empty disables canary routing.
    pub target_url: String,

    /// Percentage of requests (0-100) diverted to the canary.
    pub weight: i32,
}

/// Static chaos configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChaosConfig {
    /// Simulated region identifier (e.g. "eu-west-1").
    pub simulate_region: Option<String>,

    /// How long a fetched settings snapshot stays fresh, in milliseconds.
    pub settings_ttl_ms: u64,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            simulate_region: None,
            settings_ttl_ms: 1000,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Maximum admissions per client within the window.
    pub limit: usize,

    /// Sliding window length in seconds.
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limit: 100,
            window_secs: 60,
        }
    }
}

/// Traffic logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TrafficConfig {
    /// Publish sanitized traffic to the store.
    pub enabled: bool,

    /// Maximum bytes of each body kept for the log entry.
    pub capture_limit: usize,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capture_limit: 1024 * 1024, // 1MB
        }
    }
}

/// Security configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Replay query-string traffic with attack payloads.
    pub fuzzing_enabled: bool,

    /// Maximum inbound body size in bytes.
    pub max_body_size: usize,

    /// Timeout for each fuzz request in seconds.
    pub fuzz_timeout_secs: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            fuzzing_enabled: false,
            max_body_size: 2 * 1024 * 1024, // 2MB
            fuzz_timeout_secs: 10,
        }
    }
}

/// Alert webhook configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AlertConfig {
    /// Webhook URL. Empty disables alerts.
    pub webhook_url: String,
}

/// Background task configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackgroundConfig {
    /// Maximum concurrently running detached tasks (logging, fuzzing).
    pub max_tasks: usize,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self { max_tasks: 256 }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts against the primary backend (1 = no retry).
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
