//! Ghost mode: serve the last known-good response when the backend is gone.
//!
//! Records are written by an external learner; the proxy only reads them.

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::Response,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::http::response::json_error;
use crate::lifecycle::BackgroundTasks;
use crate::observability::metrics;
use crate::store::{SharedStore, GHOST_COUNT_KEY};

pub const X_CHAOS_GHOST: &str = "x-chaos-ghost";
pub const X_CHAOS_ORIGINAL_STATUS: &str = "x-chaos-original-status";

/// A cached response for one (method, path).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GhostEntry {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub path: String,
    pub status: u16,
    #[serde(default, alias = "body")]
    pub response_body: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl GhostEntry {
    pub fn new(method: &str, path: &str, status: u16, response_body: impl Into<String>) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            status,
            response_body: response_body.into(),
            timestamp: Some(Utc::now()),
        }
    }

    fn into_response(self) -> Option<Response> {
        let status = StatusCode::from_u16(self.status).ok()?;
        let mut response = Response::new(Body::from(self.response_body));
        *response.status_mut() = status;
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(X_CHAOS_GHOST, HeaderValue::from_static("true"));
        headers.insert(X_CHAOS_ORIGINAL_STATUS, HeaderValue::from(status.as_u16()));
        Some(response)
    }
}

/// Fallback consulted after a transport failure to the primary backend.
#[derive(Clone)]
pub struct GhostFallback {
    store: SharedStore,
    background: BackgroundTasks,
}

impl GhostFallback {
    pub fn new(store: SharedStore, background: BackgroundTasks) -> Self {
        Self { store, background }
    }

    /// Answer from the ghost cache, or a fixed 502 when nothing usable is cached.
    pub async fn respond(&self, method: &str, path: &str, request_id: &str) -> Response {
        let entry = match self.store.ghost_response(method, path).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(request_id, method, path, error = %e, "Ghost lookup failed");
                None
            }
        };

        let response = entry.and_then(|entry| {
            let status = entry.status;
            let response = entry.into_response();
            if response.is_none() {
                tracing::warn!(request_id, method, path, status, "Ghost record has invalid status, ignoring");
            }
            response
        });

        match response {
            Some(response) => {
                tracing::info!(
                    request_id,
                    method,
                    path,
                    status = response.status().as_u16(),
                    "Ghost mode: serving cached response"
                );
                metrics::record_ghost_response();
                self.count_activation();
                response
            }
            None => {
                tracing::warn!(request_id, method, path, "Backend unreachable and no ghost response cached");
                metrics::record_ghost_miss();
                json_error(StatusCode::BAD_GATEWAY, "Service temporarily unavailable")
            }
        }
    }

    fn count_activation(&self) {
        let store = self.store.clone();
        self.background.spawn("ghost_count", async move {
            if let Err(e) = store.incr_counter(GHOST_COUNT_KEY).await {
                tracing::debug!(error = %e, "Failed to bump ghost counter");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use http_body_util::BodyExt;
    use std::sync::Arc;

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn fallback(store: Arc<MemoryStore>) -> GhostFallback {
        GhostFallback::new(store, BackgroundTasks::new(8))
    }

    #[tokio::test]
    async fn test_hit_serves_cached_response() {
        let store = Arc::new(MemoryStore::new());
        store.insert_ghost(GhostEntry::new("GET", "/users", 200, r#"{"id":1}"#));

        let response = fallback(store.clone()).respond("GET", "/users", "req-1").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[X_CHAOS_GHOST], "true");
        assert_eq!(response.headers()[X_CHAOS_ORIGINAL_STATUS], "200");
        assert_eq!(body_string(response).await, r#"{"id":1}"#);

        // The counter bump runs detached.
        for _ in 0..50 {
            if store.counter(GHOST_COUNT_KEY) == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(store.counter(GHOST_COUNT_KEY), 1);
    }

    #[tokio::test]
    async fn test_miss_is_bad_gateway() {
        let store = Arc::new(MemoryStore::new());
        store.insert_ghost(GhostEntry::new("POST", "/users", 201, "{}"));

        let response = fallback(store).respond("GET", "/users", "req-2").await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(response.headers().get(X_CHAOS_GHOST).is_none());
        assert_eq!(
            body_string(response).await,
            r#"{"error":"Service temporarily unavailable"}"#
        );
    }

    #[tokio::test]
    async fn test_store_failure_is_bad_gateway() {
        let store = Arc::new(MemoryStore::new());
        store.insert_ghost(GhostEntry::new("GET", "/users", 200, "{}"));
        store.set_failing(true);

        let response = fallback(store).respond("GET", "/users", "req-3").await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_invalid_status_is_a_miss() {
        let store = Arc::new(MemoryStore::new());
        store.insert_ghost(GhostEntry::new("GET", "/odd", 42, "{}"));

        let response = fallback(store).respond("GET", "/odd", "req-4").await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_learner_record_format() {
        let raw = r#"{"status":200,"body":"{\"ok\":true}","headers":{"a":"b"},"timestamp":"2024-01-01T00:00:00Z"}"#;
        let entry: GhostEntry = serde_json::from_str(raw).unwrap();
        assert_eq!(entry.status, 200);
        assert_eq!(entry.response_body, r#"{"ok":true}"#);
        assert!(entry.timestamp.is_some());
    }
}
