//! Redis-backed store client.
//!
//! Holds one multiplexed connection, opened lazily and dropped on
//! connection-level errors so the next call reconnects. Every command runs
//! under the configured timeout.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::timeout;

use crate::chaos::ChaosSettings;
use crate::config::StoreConfig;
use crate::observability::metrics;
use crate::proxy::ghost::GhostEntry;
use crate::store::{
    encode_traffic, ghost_key, ChaosStore, StoreError, BLOCKED_IPS_KEY, RECENT_LOGS_CAP,
    RECENT_LOGS_KEY, SETTINGS_KEY, TRAFFIC_CHANNEL,
};
use crate::traffic::TrafficLogEntry;

pub struct RedisStore {
    client: redis::Client,
    conn: RwLock<Option<MultiplexedConnection>>,
    timeout: Duration,
}

impl RedisStore {
    /// Create a client. No connection is made until the first command.
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = redis::Client::open(connection_url(&config.address, &config.password))?;
        Ok(Self {
            client,
            conn: RwLock::new(None),
            timeout: Duration::from_millis(config.timeout_ms),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        if let Some(conn) = self.conn.read().await.as_ref() {
            return Ok(conn.clone());
        }

        let mut slot = self.conn.write().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self.client.get_multiplexed_async_connection().await?;
        *slot = Some(conn.clone());
        Ok(conn)
    }

    async fn reset(&self) {
        *self.conn.write().await = None;
    }

    /// Run one command against the shared connection with a deadline.
    async fn run<T, F, Fut>(&self, op: &'static str, command: F) -> Result<T, StoreError>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        let attempt = async move {
            let conn = self.connection().await?;
            command(conn).await.map_err(StoreError::from)
        };

        let result = match timeout(self.timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        };

        if let Err(e) = &result {
            metrics::record_store_error(op);
            let drop_connection = match e {
                StoreError::Command(err) => err.is_io_error() || err.is_connection_dropped(),
                StoreError::Timeout(_) => true,
                _ => false,
            };
            if drop_connection {
                self.reset().await;
            }
        }
        result
    }

    /// Add a client identifier to the blocklist.
    pub async fn block_ip(&self, client: &str) -> Result<bool, StoreError> {
        let client = client.to_string();
        self.run("block_ip", |mut conn| async move {
            let added: i64 = conn.sadd(BLOCKED_IPS_KEY, &client).await?;
            Ok(added > 0)
        })
        .await
    }

    /// Remove a client identifier from the blocklist.
    pub async fn unblock_ip(&self, client: &str) -> Result<bool, StoreError> {
        let client = client.to_string();
        self.run("unblock_ip", |mut conn| async move {
            let removed: i64 = conn.srem(BLOCKED_IPS_KEY, &client).await?;
            Ok(removed > 0)
        })
        .await
    }

    /// Most recent published traffic entries, newest first.
    pub async fn recent_traffic(&self, count: usize) -> Result<Vec<TrafficLogEntry>, StoreError> {
        let stop = count.clamp(1, RECENT_LOGS_CAP as usize) as isize - 1;
        let raw = self
            .run("recent_traffic", |mut conn| async move {
                let raw: Vec<String> = conn.lrange(RECENT_LOGS_KEY, 0, stop).await?;
                Ok(raw)
            })
            .await?;

        // Entries written by other tools may not match; skip them.
        Ok(raw
            .iter()
            .filter_map(|entry| serde_json::from_str(entry).ok())
            .collect())
    }

    /// Overwrite the chaos settings hash.
    pub async fn set_chaos_settings(&self, settings: &ChaosSettings) -> Result<(), StoreError> {
        let fields = settings.to_fields();
        self.run("set_chaos_settings", |mut conn| async move {
            let _: () = conn.hset_multiple(SETTINGS_KEY, &fields).await?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl ChaosStore for RedisStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.run("ping", |mut conn| async move {
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }

    async fn ghost_response(&self, method: &str, path: &str) -> Result<Option<GhostEntry>, StoreError> {
        let key = ghost_key(method, path);
        let raw = self
            .run("ghost_response", |mut conn| async move {
                let raw: Option<String> = conn.get(&key).await?;
                Ok(raw)
            })
            .await?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn chaos_settings(&self) -> Result<ChaosSettings, StoreError> {
        let fields = self
            .run("chaos_settings", |mut conn| async move {
                let fields: HashMap<String, String> = conn.hgetall(SETTINGS_KEY).await?;
                Ok(fields)
            })
            .await?;
        Ok(ChaosSettings::from_fields(&fields))
    }

    async fn is_blocked(&self, client: &str) -> Result<bool, StoreError> {
        let client = client.to_string();
        self.run("is_blocked", |mut conn| async move {
            let member: bool = conn.sismember(BLOCKED_IPS_KEY, &client).await?;
            Ok(member)
        })
        .await
    }

    async fn blocked_ips(&self) -> Result<Vec<String>, StoreError> {
        self.run("blocked_ips", |mut conn| async move {
            let members: Vec<String> = conn.smembers(BLOCKED_IPS_KEY).await?;
            Ok(members)
        })
        .await
    }

    async fn publish_traffic(&self, entry: &TrafficLogEntry) -> Result<(), StoreError> {
        let data = encode_traffic(entry)?;
        self.run("publish_traffic", |mut conn| async move {
            let _: () = redis::pipe()
                .publish(TRAFFIC_CHANNEL, &data)
                .ignore()
                .lpush(RECENT_LOGS_KEY, &data)
                .ignore()
                .ltrim(RECENT_LOGS_KEY, 0, RECENT_LOGS_CAP - 1)
                .ignore()
                .query_async(&mut conn)
                .await?;
            Ok(())
        })
        .await
    }

    async fn incr_counter(&self, key: &str) -> Result<i64, StoreError> {
        let key = key.to_string();
        self.run("incr_counter", |mut conn| async move {
            let value: i64 = conn.incr(&key, 1).await?;
            Ok(value)
        })
        .await
    }
}

/// Build a `redis://` URL from a bare address and optional password.
fn connection_url(address: &str, password: &str) -> String {
    if address.starts_with("redis://") || address.starts_with("rediss://") {
        return address.to_string();
    }
    let raw = format!("redis://{}/0", address);
    let mut url = match url::Url::parse(&raw) {
        Ok(url) => url,
        Err(_) => return raw,
    };
    if !password.is_empty() && url.set_password(Some(password)).is_err() {
        tracing::warn!(address, "Store address cannot carry credentials, connecting without password");
    }
    url.to_string()
}
