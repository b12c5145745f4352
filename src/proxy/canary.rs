//! Weighted canary routing.
//!
//! Each request rolls independently; there is no stickiness. A roll below
//! the weight is served by the canary upstream, anything else continues to
//! the primary proxy.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::config::CanaryConfig;
use crate::http::request::buffer_body;
use crate::http::response::json_error;
use crate::http::RequestIdExt;
use crate::observability::metrics;
use crate::proxy::forward::{HttpClient, ProxyError, Upstream};
use crate::security::client::peer_addr;

pub struct CanaryRouter {
    target: Option<Upstream>,
    weight: u32,
    client: HttpClient,
    max_body_size: usize,
}

impl CanaryRouter {
    /// Build a router. An empty target, a non-positive weight or an
    /// unparseable target all disable canary routing.
    pub fn new(config: &CanaryConfig, client: HttpClient, max_body_size: usize) -> Self {
        let target = if config.target_url.is_empty() || config.weight <= 0 {
            None
        } else {
            match Upstream::parse(&config.target_url) {
                Ok(upstream) => {
                    tracing::info!(
                        target = %config.target_url,
                        weight = config.weight,
                        "Canary routing enabled"
                    );
                    Some(upstream)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Invalid canary target, canary routing disabled");
                    None
                }
            }
        };

        Self {
            target,
            weight: config.weight.clamp(0, 100) as u32,
            client,
            max_body_size,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    /// Decision for a given roll in `[0, 100)`.
    pub fn decide(&self, roll: u32) -> bool {
        self.is_enabled() && roll < self.weight
    }

    pub fn should_route(&self) -> bool {
        self.decide(fastrand::u32(0..100))
    }

    async fn forward(&self, upstream: &Upstream, request: Request<Body>) -> Response {
        let request_id = request.request_id().to_string();
        let peer = peer_addr(&request).map(|addr| addr.ip());
        let (parts, body) = request.into_parts();
        let body = match buffer_body(body, self.max_body_size).await {
            Ok(body) => body,
            Err(rejection) => return rejection,
        };

        let result: Result<Response, ProxyError> = async {
            let outbound = upstream.build_request(&parts, body, peer)?;
            upstream.send(&self.client, outbound).await
        }
        .await;

        match result {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    request_id = %request_id,
                    upstream = upstream.authority(),
                    error = %e,
                    "Canary upstream failed"
                );
                json_error(StatusCode::BAD_GATEWAY, "Canary backend unavailable")
            }
        }
    }
}

/// Divert a weighted share of traffic to the canary upstream.
pub async fn canary_middleware(
    State(router): State<Arc<CanaryRouter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let upstream = match &router.target {
        Some(upstream) if router.should_route() => upstream,
        _ => return next.run(request).await,
    };

    tracing::debug!(
        request_id = %request.request_id(),
        path = %request.uri().path(),
        upstream = upstream.authority(),
        "Routing to canary"
    );
    metrics::record_canary();
    router.forward(upstream, request).await
}
