//! Structured logging.
//!
//! `init_tracing` installs the global subscriber once: JSON lines in
//! production, human-readable output elsewhere. `RUST_LOG` overrides the
//! configured level. `log_requests` is the pipeline's request log stage.

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use tokio::time::Instant;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::http::RequestIdExt;
use crate::observability::metrics;
use crate::security::client::client_id;

/// Install the global tracing subscriber.
pub fn init_tracing(log_level: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("chaos_proxy={level},tower_http={level}", level = log_level)));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    if let Err(e) = result {
        // A subscriber is already installed (tests, embedding); keep it.
        tracing::debug!(error = %e, "Tracing subscriber already initialised");
    }
}

/// Log one line per completed request and record request metrics.
pub async fn log_requests(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request.request_id().to_string();
    let client = client_id(&request);

    let response = next.run(request).await;

    let status = response.status().as_u16();
    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        client = %client,
        status,
        duration_ms = start.elapsed().as_millis() as u64,
        "Request completed"
    );
    metrics::record_request(method.as_str(), status, start);

    response
}
