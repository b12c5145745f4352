//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! optional TOML file
//!     → loader.rs (parse & deserialize)
//!     → environment overrides (PORT, TARGET_URL, REDIS_ADDR, ...)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → handed to HttpServer at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only chaos settings change at runtime,
//!   and those live in the external store
//! - All fields have defaults to allow an empty environment
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AlertConfig, BackgroundConfig, CanaryConfig, ChaosConfig, ListenerConfig,
    ObservabilityConfig, ProxyConfig, RateLimitConfig, RetryConfig, SecurityConfig,
    StoreBackend, StoreConfig, TrafficConfig, UpstreamConfig,
};
