//! External key-value store contract.
//!
//! The proxy is a client of this store, never its owner: chaos settings,
//! the blocklist and ghost responses are written by other tools. Every
//! call is expected to fail fast; callers decide whether a failure is
//! fatal (it almost never is).
//!
//! # Keys
//! ```text
//! chaos:ghost:{METHOD}:{path}    string  JSON ghost record
//! chaos:settings                 hash    chaos parameters (string values)
//! chaos:settings:blocked_ips     set     blocked client identifiers
//! chaos:traffic                  channel sanitized traffic log entries
//! chaos:logs:recent              list    last 50 traffic log entries
//! chaos:stats:ghost_count        counter ghost-mode activations
//! ```

pub mod memory;
pub mod redis_store;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::chaos::ChaosSettings;
use crate::proxy::ghost::GhostEntry;
use crate::traffic::TrafficLogEntry;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

pub const SETTINGS_KEY: &str = "chaos:settings";
pub const BLOCKED_IPS_KEY: &str = "chaos:settings:blocked_ips";
pub const TRAFFIC_CHANNEL: &str = "chaos:traffic";
pub const RECENT_LOGS_KEY: &str = "chaos:logs:recent";
pub const RECENT_LOGS_CAP: isize = 50;
pub const GHOST_COUNT_KEY: &str = "chaos:stats:ghost_count";

/// Key under which the ghost response for a route is stored.
pub fn ghost_key(method: &str, path: &str) -> String {
    format!("chaos:ghost:{}:{}", method, path)
}

/// Errors raised by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store command failed: {0}")]
    Command(#[from] redis::RedisError),

    #[error("store timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to decode stored value: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Operations the proxy needs from the external store.
#[async_trait]
pub trait ChaosStore: Send + Sync {
    /// Connectivity check.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Last known-good response for a route, if any.
    async fn ghost_response(&self, method: &str, path: &str) -> Result<Option<GhostEntry>, StoreError>;

    /// Current chaos parameters.
    async fn chaos_settings(&self) -> Result<ChaosSettings, StoreError>;

    /// Blocklist membership.
    async fn is_blocked(&self, client: &str) -> Result<bool, StoreError>;

    /// Full blocklist.
    async fn blocked_ips(&self) -> Result<Vec<String>, StoreError>;

    /// Publish a sanitized traffic entry and append it to the recent log.
    async fn publish_traffic(&self, entry: &TrafficLogEntry) -> Result<(), StoreError>;

    /// Increment a counter, returning the new value.
    async fn incr_counter(&self, key: &str) -> Result<i64, StoreError>;
}

/// Store handle shared across the pipeline.
pub type SharedStore = Arc<dyn ChaosStore>;

/// Encode a traffic entry the way subscribers expect it.
pub(crate) fn encode_traffic(entry: &TrafficLogEntry) -> Result<String, StoreError> {
    Ok(serde_json::to_string(entry)?)
}
