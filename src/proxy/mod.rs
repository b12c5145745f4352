//! Reverse proxy core.
//!
//! # Data Flow
//! ```text
//! Request (body already bounded)
//!     → canary.rs (weighted diversion to the canary upstream)
//!     → forward.rs (host rewrite, hop-by-hop strip, send)
//!     → transport failure: retry with backoff, then ghost.rs
//!     → ghost.rs (cached response tagged X-Chaos-Ghost, or 502)
//! ```

pub mod canary;
pub mod forward;
pub mod ghost;

use axum::{body::Body, extract::State, http::Request, response::Response};
use std::sync::Arc;

use crate::http::request::buffer_body;
use crate::http::RequestIdExt;
use crate::resilience::RetryPolicy;
use crate::security::client::peer_addr;

pub use canary::{canary_middleware, CanaryRouter};
pub use forward::{build_client, HttpClient, ProxyError, Upstream};
pub use ghost::{GhostEntry, GhostFallback};

/// Forwards to the primary upstream and falls back to ghost mode.
pub struct ReverseProxy {
    client: HttpClient,
    upstream: Upstream,
    retry: RetryPolicy,
    ghost: GhostFallback,
    max_body_size: usize,
}

impl ReverseProxy {
    pub fn new(
        client: HttpClient,
        upstream: Upstream,
        retry: RetryPolicy,
        ghost: GhostFallback,
        max_body_size: usize,
    ) -> Self {
        Self {
            client,
            upstream,
            retry,
            ghost,
            max_body_size,
        }
    }

    pub async fn forward(&self, request: Request<Body>) -> Response {
        let request_id = request.request_id().to_string();
        let peer = peer_addr(&request).map(|addr| addr.ip());
        let (parts, body) = request.into_parts();
        let body = match buffer_body(body, self.max_body_size).await {
            Ok(body) => body,
            Err(rejection) => return rejection,
        };

        let method = parts.method.as_str();
        let path = parts.uri.path();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let outbound = match self.upstream.build_request(&parts, body.clone(), peer) {
                Ok(outbound) => outbound,
                Err(e) => {
                    tracing::error!(request_id = %request_id, error = %e, "Failed to build upstream request");
                    break;
                }
            };

            match self.upstream.send(&self.client, outbound).await {
                Ok(response) => return response,
                Err(e) => {
                    tracing::warn!(
                        request_id = %request_id,
                        upstream = self.upstream.authority(),
                        attempt,
                        error = %e,
                        "Upstream transport failure"
                    );
                    if !self.retry.should_retry(attempt) {
                        break;
                    }
                    let delay = self.retry.backoff(attempt);
                    tracing::info!(request_id = %request_id, attempt, delay = ?delay, "Retrying upstream");
                    tokio::time::sleep(delay).await;
                }
            }
        }

        self.ghost.respond(method, path, &request_id).await
    }
}

/// Terminal handler for every proxied path.
pub async fn proxy_handler(State(proxy): State<Arc<ReverseProxy>>, request: Request<Body>) -> Response {
    proxy.forward(request).await
}
