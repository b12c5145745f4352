//! Startup orchestration.
//!
//! Store selection happens here so the binary and the integration tests
//! wire subsystems the same way. A store that cannot be reached at startup
//! is not fatal: the proxy runs degraded and every store-backed feature
//! fails open until the store comes back.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{StoreBackend, StoreConfig};
use crate::store::{MemoryStore, RedisStore, SharedStore, StoreError};

/// Create the configured store client.
pub fn open_store(config: &StoreConfig) -> Result<SharedStore, StoreError> {
    match config.backend {
        StoreBackend::Redis => {
            let store = RedisStore::new(config)?;
            tracing::info!(address = %config.address, "Using Redis store");
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-process memory store, state is not shared with other tools");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Ping the store once, logging the outcome. Returns whether it answered.
pub async fn probe_store(store: &SharedStore, deadline: Duration) -> bool {
    match tokio::time::timeout(deadline, store.ping()).await {
        Ok(Ok(())) => {
            tracing::info!("Store connection established");
            true
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Store unreachable, running in degraded mode");
            false
        }
        Err(_) => {
            tracing::warn!(timeout = ?deadline, "Store ping timed out, running in degraded mode");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_answers_ping() {
        let store = open_store(&StoreConfig {
            backend: StoreBackend::Memory,
            ..StoreConfig::default()
        })
        .unwrap();
        assert!(probe_store(&store, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_unreachable_redis_is_degraded_not_fatal() {
        let store = open_store(&StoreConfig {
            backend: StoreBackend::Redis,
            address: "127.0.0.1:1".into(),
            timeout_ms: 200,
            ..StoreConfig::default()
        })
        .unwrap();
        assert!(!probe_store(&store, Duration::from_secs(2)).await);
    }
}
