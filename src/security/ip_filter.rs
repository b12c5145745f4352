//! Blocklist enforcement.
//!
//! The blocklist lives in the external store and is only ever read here.
//! A failed lookup lets the request through: availability wins over strict
//! enforcement.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::http::response::json_error;
use crate::http::RequestIdExt;
use crate::observability::metrics;
use crate::security::client::client_id;
use crate::store::SharedStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Allow,
    Block,
    /// Lookup failed; allowed without a verdict.
    FailOpen,
}

impl FilterDecision {
    pub fn is_blocked(self) -> bool {
        self == FilterDecision::Block
    }
}

#[derive(Clone)]
pub struct IpFilter {
    store: SharedStore,
}

impl IpFilter {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn check(&self, client: &str) -> FilterDecision {
        match self.store.is_blocked(client).await {
            Ok(true) => FilterDecision::Block,
            Ok(false) => FilterDecision::Allow,
            Err(e) => {
                tracing::warn!(client, error = %e, "Blocklist check failed, allowing request");
                FilterDecision::FailOpen
            }
        }
    }
}

/// Reject requests from blocklisted clients with 403.
pub async fn ip_filter_middleware(
    State(filter): State<IpFilter>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client = client_id(&request);

    if filter.check(&client).await.is_blocked() {
        tracing::warn!(
            request_id = %request.request_id(),
            client = %client,
            path = %request.uri().path(),
            "Blocked request"
        );
        metrics::record_blocked();
        return json_error(StatusCode::FORBIDDEN, "Access Denied");
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_decisions() {
        let store = Arc::new(MemoryStore::new());
        store.block("6.6.6.6");
        let filter = IpFilter::new(store.clone());

        assert_eq!(filter.check("6.6.6.6").await, FilterDecision::Block);
        assert_eq!(filter.check("1.1.1.1").await, FilterDecision::Allow);

        store.set_failing(true);
        let decision = filter.check("6.6.6.6").await;
        assert_eq!(decision, FilterDecision::FailOpen);
        assert!(!decision.is_blocked());
    }
}
