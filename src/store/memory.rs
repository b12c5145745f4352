//! In-process store.
//!
//! Implements the same contract as the Redis store so the proxy can run
//! without external infrastructure, and so tests can observe and
//! manipulate store state directly. `set_failing(true)` makes every
//! operation return `StoreError::Unavailable`.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use crate::chaos::ChaosSettings;
use crate::proxy::ghost::GhostEntry;
use crate::store::{encode_traffic, ghost_key, ChaosStore, StoreError, RECENT_LOGS_CAP};
use crate::traffic::TrafficLogEntry;

#[derive(Default)]
pub struct MemoryStore {
    ghosts: DashMap<String, GhostEntry>,
    settings: RwLock<ChaosSettings>,
    blocked: DashSet<String>,
    counters: DashMap<String, i64>,
    published: Mutex<Vec<TrafficLogEntry>>,
    failing: AtomicBool,
    settings_reads: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an unreachable store.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn insert_ghost(&self, entry: GhostEntry) {
        self.ghosts.insert(ghost_key(&entry.method, &entry.path), entry);
    }

    pub fn set_chaos_settings(&self, settings: ChaosSettings) {
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }

    pub fn block(&self, client: &str) {
        self.blocked.insert(client.to_string());
    }

    pub fn unblock(&self, client: &str) {
        self.blocked.remove(client);
    }

    /// Entries published so far, oldest first (bounded like the recent list).
    pub fn published(&self) -> Vec<TrafficLogEntry> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn counter(&self, key: &str) -> i64 {
        self.counters.get(key).map(|v| *v).unwrap_or(0)
    }

    /// Number of settings reads served, for observing cache behaviour.
    pub fn settings_reads(&self) -> usize {
        self.settings_reads.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store set to fail".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ChaosStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.check()
    }

    async fn ghost_response(&self, method: &str, path: &str) -> Result<Option<GhostEntry>, StoreError> {
        self.check()?;
        Ok(self.ghosts.get(&ghost_key(method, path)).map(|e| e.clone()))
    }

    async fn chaos_settings(&self) -> Result<ChaosSettings, StoreError> {
        self.check()?;
        self.settings_reads.fetch_add(1, Ordering::SeqCst);
        Ok(*self.settings.read().unwrap_or_else(PoisonError::into_inner))
    }

    async fn is_blocked(&self, client: &str) -> Result<bool, StoreError> {
        self.check()?;
        Ok(self.blocked.contains(client))
    }

    async fn blocked_ips(&self) -> Result<Vec<String>, StoreError> {
        self.check()?;
        let mut ips: Vec<String> = self.blocked.iter().map(|ip| ip.clone()).collect();
        ips.sort();
        Ok(ips)
    }

    async fn publish_traffic(&self, entry: &TrafficLogEntry) -> Result<(), StoreError> {
        self.check()?;
        // Same encoding path as the Redis store so serialization failures surface here too.
        encode_traffic(entry)?;

        let mut published = self.published.lock().unwrap_or_else(PoisonError::into_inner);
        published.push(entry.clone());
        let cap = RECENT_LOGS_CAP as usize;
        if published.len() > cap {
            let excess = published.len() - cap;
            published.drain(..excess);
        }
        Ok(())
    }

    async fn incr_counter(&self, key: &str) -> Result<i64, StoreError> {
        self.check()?;
        let mut value = self.counters.entry(key.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::GHOST_COUNT_KEY;

    #[tokio::test]
    async fn test_blocklist_roundtrip() {
        let store = MemoryStore::new();
        store.block("10.0.0.2");
        store.block("10.0.0.1");

        assert!(store.is_blocked("10.0.0.1").await.unwrap());
        assert!(!store.is_blocked("10.0.0.3").await.unwrap());
        assert_eq!(store.blocked_ips().await.unwrap(), vec!["10.0.0.1", "10.0.0.2"]);

        store.unblock("10.0.0.1");
        assert!(!store.is_blocked("10.0.0.1").await.unwrap());
    }

    #[tokio::test]
    async fn test_failing_mode() {
        let store = MemoryStore::new();
        store.set_failing(true);
        assert!(store.ping().await.is_err());
        assert!(store.is_blocked("1.2.3.4").await.is_err());
        assert!(store.chaos_settings().await.is_err());

        store.set_failing(false);
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_counter_increments() {
        let store = MemoryStore::new();
        assert_eq!(store.incr_counter(GHOST_COUNT_KEY).await.unwrap(), 1);
        assert_eq!(store.incr_counter(GHOST_COUNT_KEY).await.unwrap(), 2);
        assert_eq!(store.counter(GHOST_COUNT_KEY), 2);
    }
}
