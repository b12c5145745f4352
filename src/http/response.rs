//! Response helpers shared by every stage.

use axum::{
    body::Body,
    http::{header, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

pub const X_POWERED_BY: &str = "x-powered-by";
pub const POWERED_BY: &str = "ChaosProxy/1.0.0";

/// Fixed `{"error": message}` response.
pub fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Tag every response with the proxy identifier.
pub async fn powered_by_middleware(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(X_POWERED_BY, HeaderValue::from_static(POWERED_BY));
    response
}

/// Response for a panic caught at the outermost barrier.
pub fn panic_response(message: &str) -> Response {
    tracing::error!(panic = message, "Handler panicked");
    let mut response = json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}
