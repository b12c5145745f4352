//! Chaos settings and their TTL-bounded cache.
//!
//! The store owns the settings; the proxy keeps a read-only copy that is
//! refreshed at most once per TTL. A failed refresh keeps the stale copy.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::observability::metrics;
use crate::store::SharedStore;

/// Operator-controlled chaos parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChaosSettings {
    pub latency_enabled: bool,
    pub latency_min: u64,
    pub latency_max: u64,
    pub failure_enabled: bool,
    pub failure_rate: u32,
}

impl ChaosSettings {
    /// Build settings from string-valued hash fields.
    ///
    /// Missing or malformed numbers fall back to zero, booleans to false.
    pub fn from_fields(fields: &HashMap<String, String>) -> Self {
        let flag = |key: &str| fields.get(key).map(|v| v.trim() == "true").unwrap_or(false);
        let number = |key: &str| {
            fields
                .get(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(0)
        };

        Self {
            latency_enabled: flag("latency_enabled"),
            latency_min: number("latency_min"),
            latency_max: number("latency_max"),
            failure_enabled: flag("failure_enabled"),
            failure_rate: u32::try_from(number("failure_rate")).unwrap_or(u32::MAX),
        }
    }

    /// Hash fields in the store's string encoding.
    pub fn to_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("latency_enabled", self.latency_enabled.to_string()),
            ("latency_min", self.latency_min.to_string()),
            ("latency_max", self.latency_max.to_string()),
            ("failure_enabled", self.failure_enabled.to_string()),
            ("failure_rate", self.failure_rate.to_string()),
        ]
    }

    /// Dynamic latency bounds in milliseconds, if latency injection applies.
    pub fn latency_range(&self) -> Option<(u64, u64)> {
        (self.latency_enabled && self.latency_max > self.latency_min)
            .then_some((self.latency_min, self.latency_max))
    }
}

#[derive(Debug)]
struct CachedSettings {
    settings: ChaosSettings,
    checked_at: Option<Instant>,
}

/// Read-through cache over the store's chaos settings.
pub struct SettingsCache {
    store: SharedStore,
    ttl: Duration,
    state: RwLock<CachedSettings>,
}

impl SettingsCache {
    pub fn new(store: SharedStore, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            state: RwLock::new(CachedSettings {
                settings: ChaosSettings::default(),
                checked_at: None,
            }),
        }
    }

    /// Return a copy of the current settings, refreshing first if stale.
    pub async fn snapshot(&self) -> ChaosSettings {
        self.refresh().await;
        self.state.read().await.settings
    }

    async fn refresh(&self) {
        {
            let state = self.state.read().await;
            if self.is_fresh(&state) {
                return;
            }
        }

        let mut state = self.state.write().await;
        // Another request may have refreshed while we waited for the write lock.
        if self.is_fresh(&state) {
            return;
        }

        match self.store.chaos_settings().await {
            Ok(settings) => {
                if settings != state.settings {
                    tracing::info!(?settings, "Chaos settings updated");
                }
                state.settings = settings;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch chaos settings, keeping last known values");
                metrics::record_store_error("chaos_settings");
            }
        }
        state.checked_at = Some(Instant::now());
    }

    fn is_fresh(&self, state: &CachedSettings) -> bool {
        state
            .checked_at
            .map(|at| at.elapsed() < self.ttl)
            .unwrap_or(false)
    }
}
