//! Traffic logging middleware.
//!
//! Buffers the request body (rejecting oversized bodies with 413), lets the
//! rest of the pipeline run, then tees the response body. Once the response
//! has finished streaming, the sanitized exchange is published to the store
//! from a background task. Requests carrying credentials are never logged.

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{Method, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::time::Instant;

use crate::config::{SecurityConfig, TrafficConfig};
use crate::http::request::buffer_body;
use crate::http::RequestIdExt;
use crate::lifecycle::BackgroundTasks;
use crate::observability::metrics;
use crate::store::SharedStore;
use crate::traffic::{Sanitizer, TeeBody, TrafficLogEntry};

pub struct TrafficLogger {
    store: SharedStore,
    sanitizer: Sanitizer,
    background: BackgroundTasks,
    enabled: bool,
    capture_limit: usize,
    max_body_size: usize,
}

/// What the logger remembers about a request while it is in flight.
struct Exchange {
    timestamp: DateTime<Utc>,
    started: Instant,
    method: Method,
    path: String,
    request_body: Bytes,
    status: StatusCode,
}

impl TrafficLogger {
    pub fn new(
        store: SharedStore,
        background: BackgroundTasks,
        traffic: &TrafficConfig,
        security: &SecurityConfig,
    ) -> Self {
        Self {
            store,
            sanitizer: Sanitizer::new(),
            background,
            enabled: traffic.enabled,
            capture_limit: traffic.capture_limit,
            max_body_size: security.max_body_size,
        }
    }

    /// Sanitize a finished exchange into a log entry.
    fn entry(&self, exchange: Exchange, response_body: &[u8]) -> TrafficLogEntry {
        let request_body = String::from_utf8_lossy(&exchange.request_body);
        let response_body = String::from_utf8_lossy(response_body);
        TrafficLogEntry {
            timestamp: exchange.timestamp,
            method: exchange.method.to_string(),
            path: exchange.path,
            request_body: self.sanitizer.sanitize(&request_body).into_owned(),
            status: exchange.status.as_u16(),
            response_body: self.sanitizer.sanitize(&response_body).into_owned(),
            duration: format!("{:?}", exchange.started.elapsed()),
        }
    }

    fn publish(self: &Arc<Self>, exchange: Exchange, response_body: Bytes) {
        let logger = Arc::clone(self);
        self.background.spawn("traffic_log", async move {
            let entry = logger.entry(exchange, &response_body);
            match logger.store.publish_traffic(&entry).await {
                Ok(()) => metrics::record_traffic_log("published"),
                Err(e) => {
                    tracing::warn!(method = %entry.method, path = %entry.path, error = %e, "Failed to publish traffic log");
                    metrics::record_traffic_log("failed");
                }
            }
        });
    }
}

/// Capture the exchange and publish it once the response completes.
pub async fn traffic_middleware(
    State(logger): State<Arc<TrafficLogger>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !logger.enabled {
        return next.run(request).await;
    }

    let started = Instant::now();
    let timestamp = Utc::now();
    let sensitive = Sanitizer::has_sensitive_header(request.headers());

    let (parts, body) = request.into_parts();
    let body = match buffer_body(body, logger.max_body_size).await {
        Ok(body) => body,
        Err(rejection) => return rejection,
    };
    let method = parts.method.clone();
    let path = parts.uri.path().to_string();
    let request_body = body.slice(..body.len().min(logger.capture_limit));

    let request = Request::from_parts(parts, Body::from(body));
    let request_id = request.request_id().to_string();
    let response = next.run(request).await;

    if sensitive {
        tracing::debug!(request_id = %request_id, method = %method, path = %path, "Skipped traffic log (sensitive headers)");
        metrics::record_traffic_log("skipped_sensitive");
        return response;
    }

    let exchange = Exchange {
        timestamp,
        started,
        method,
        path,
        request_body,
        status: response.status(),
    };

    let (parts, body) = response.into_parts();
    let limit = logger.capture_limit;
    let tee = TeeBody::new(body, limit, move |captured| logger.publish(exchange, captured));
    Response::from_parts(parts, Body::new(tee))
}
