//! Ghost-mode tests: a dead backend is masked by cached responses.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;

use chaos_proxy::proxy::GhostEntry;
use chaos_proxy::store::{MemoryStore, GHOST_COUNT_KEY};
use serde_json::Value;

mod common;

/// Accepts connections and drops them straight away.
async fn start_hanging_up_backend() -> (std::net::SocketAddr, Arc<AtomicU32>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicU32::new(0));
    let counter = accepted.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            drop(socket);
        }
    });
    (addr, accepted)
}

#[tokio::test]
async fn test_dead_backend_serves_ghost_response() {
    let backend = common::dead_address().await;
    let store = Arc::new(MemoryStore::new());
    store.insert_ghost(GhostEntry::new("GET", "/users", 200, r#"[{"id":1}]"#));
    let proxy = common::spawn_proxy(common::test_config(backend), store.clone()).await;

    let res = common::client().get(proxy.url("/users")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["x-chaos-ghost"], "true");
    assert_eq!(res.headers()["x-chaos-original-status"], "200");
    assert_eq!(res.headers()["content-type"], "application/json");
    assert_eq!(res.text().await.unwrap(), r#"[{"id":1}]"#);

    assert!(common::eventually(|| store.counter(GHOST_COUNT_KEY) == 1).await);
}

#[tokio::test]
async fn test_ghost_lookup_is_per_method() {
    let backend = common::dead_address().await;
    let store = Arc::new(MemoryStore::new());
    store.insert_ghost(GhostEntry::new("GET", "/users", 200, "[]"));
    let proxy = common::spawn_proxy(common::test_config(backend), store).await;

    let res = common::client().post(proxy.url("/users")).body("{}").send().await.unwrap();
    assert_eq!(res.status(), 502);
    assert!(res.headers().get("x-chaos-ghost").is_none());
}

#[tokio::test]
async fn test_no_ghost_entry_is_bad_gateway() {
    let backend = common::dead_address().await;
    let proxy = common::spawn_proxy(common::test_config(backend), Arc::new(MemoryStore::new())).await;

    let res = common::client().get(proxy.url("/missing")).send().await.unwrap();
    assert_eq!(res.status(), 502);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Service temporarily unavailable");
}

#[tokio::test]
async fn test_store_outage_during_ghost_lookup_is_bad_gateway() {
    let backend = common::dead_address().await;
    let store = Arc::new(MemoryStore::new());
    store.insert_ghost(GhostEntry::new("GET", "/users", 200, "[]"));
    store.set_failing(true);
    let proxy = common::spawn_proxy(common::test_config(backend), store).await;

    let res = common::client().get(proxy.url("/users")).send().await.unwrap();
    assert_eq!(res.status(), 502);
}

#[tokio::test]
async fn test_backend_error_status_is_not_ghosted() {
    let (backend, _) = common::start_programmable_backend(|_| async {
        (500, r#"{"error":"boom"}"#.to_string())
    })
    .await;
    let store = Arc::new(MemoryStore::new());
    store.insert_ghost(GhostEntry::new("GET", "/users", 200, "[]"));
    let proxy = common::spawn_proxy(common::test_config(backend), store).await;

    let res = common::client().get(proxy.url("/users")).send().await.unwrap();
    assert_eq!(res.status(), 500);
    assert!(res.headers().get("x-chaos-ghost").is_none());
    assert_eq!(res.text().await.unwrap(), r#"{"error":"boom"}"#);
}

#[tokio::test]
async fn test_transport_failures_are_retried_before_ghosting() {
    let (backend, accepted) = start_hanging_up_backend().await;
    let mut config = common::test_config(backend);
    config.retries.max_attempts = 3;
    config.retries.base_delay_ms = 10;
    config.retries.max_delay_ms = 50;
    let store = Arc::new(MemoryStore::new());
    store.insert_ghost(GhostEntry::new("GET", "/flaky", 203, r#"{"cached":true}"#));
    let proxy = common::spawn_proxy(config, store).await;

    let res = common::client().get(proxy.url("/flaky")).send().await.unwrap();
    assert_eq!(res.status(), 203);
    assert_eq!(res.headers()["x-chaos-ghost"], "true");
    assert_eq!(accepted.load(Ordering::SeqCst), 3);
}
