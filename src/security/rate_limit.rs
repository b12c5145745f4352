//! Per-client sliding-window rate limiting.
//!
//! Each client keeps the instants of its admitted requests inside the
//! window. Old instants are pruned on access; a periodic sweep drops
//! clients whose history has emptied so idle clients do not accumulate.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::http::response::json_error;
use crate::http::RequestIdExt;
use crate::observability::metrics;
use crate::security::client::client_id;

pub struct SlidingWindowLimiter {
    windows: RwLock<HashMap<String, VecDeque<Instant>>>,
    limit: usize,
    window: Duration,
}

impl SlidingWindowLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            limit,
            window,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.limit, Duration::from_secs(config.window_secs))
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn allow(&self, client: &str) -> bool {
        self.allow_at(client, Instant::now())
    }

    /// Admission check at a given instant.
    pub fn allow_at(&self, client: &str, now: Instant) -> bool {
        let mut windows = self.windows.write().unwrap_or_else(PoisonError::into_inner);
        let history = windows.entry(client.to_string()).or_default();

        prune(history, now, self.window);
        if history.len() >= self.limit {
            return false;
        }
        history.push_back(now);
        true
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Prune every client and drop the empty ones. Returns how many were dropped.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut windows = self.windows.write().unwrap_or_else(PoisonError::into_inner);
        let before = windows.len();
        windows.retain(|_, history| {
            prune(history, now, self.window);
            !history.is_empty()
        });
        before - windows.len()
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Sweep once per window until shutdown.
    pub fn spawn_sweeper(self: &Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + limiter.window, limiter.window);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = limiter.sweep();
                        if evicted > 0 {
                            tracing::debug!(evicted, remaining = limiter.tracked_clients(), "Rate limiter sweep");
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("Rate limiter sweep stopped");
                        break;
                    }
                }
            }
        })
    }
}

fn prune(history: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = history.front() {
        if now.saturating_duration_since(oldest) < window {
            break;
        }
        history.pop_front();
    }
}

/// Reject clients over their window budget with 429.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<SlidingWindowLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client = client_id(&request);

    if limiter.allow(&client) {
        return next.run(request).await;
    }

    tracing::warn!(
        request_id = %request.request_id(),
        client = %client,
        "Rate limit exceeded"
    );
    metrics::record_rate_limited();

    let mut response = json_error(StatusCode::TOO_MANY_REQUESTS, "Too many requests. Please try again later.");
    response.headers_mut().insert(
        header::RETRY_AFTER,
        HeaderValue::from(limiter.window().as_secs()),
    );
    response
}
