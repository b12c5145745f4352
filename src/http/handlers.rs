//! Health and blocklist endpoints.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::http::response::json_error;
use crate::store::SharedStore;

const HEALTH_PING_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
    pub redis: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockedIpsResponse {
    pub blocked_ips: Vec<String>,
    pub count: usize,
}

/// Liveness plus store connectivity.
pub async fn healthz(State(store): State<SharedStore>) -> Response {
    let connected = matches!(
        tokio::time::timeout(HEALTH_PING_TIMEOUT, store.ping()).await,
        Ok(Ok(()))
    );

    let (status, body) = if connected {
        (StatusCode::OK, HealthResponse { status: "ok".into(), redis: "connected".into() })
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            HealthResponse { status: "degraded".into(), redis: "disconnected".into() },
        )
    };
    (status, Json(body)).into_response()
}

/// Current blocklist.
pub async fn blocked_ips(State(store): State<SharedStore>) -> Response {
    match store.blocked_ips().await {
        Ok(blocked_ips) => Json(BlockedIpsResponse {
            count: blocked_ips.len(),
            blocked_ips,
        })
        .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to fetch blocked IPs");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch blocked IPs")
        }
    }
}
