//! Request correlation and body buffering.
//!
//! # Responsibilities
//! - Assign every request a correlation id (echo the caller's, or generate one)
//! - Expose the id to later stages through a request extension
//! - Buffer request bodies under a hard size cap

use axum::{
    body::{Body, Bytes},
    http::{HeaderValue, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use uuid::Uuid;

use crate::http::response::json_error;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Correlation id stored in request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    /// Random hex identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Access to the correlation id from any stage.
pub trait RequestIdExt {
    fn request_id(&self) -> &str;
}

impl<B> RequestIdExt for Request<B> {
    fn request_id(&self) -> &str {
        self.extensions()
            .get::<RequestId>()
            .map(RequestId::as_str)
            .unwrap_or("unknown")
    }
}

/// Assign the correlation id and mirror it on the response.
pub async fn request_id_middleware(mut request: Request<Body>, next: Next) -> Response {
    let supplied = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| RequestId(id.to_string()));
    let id = supplied.unwrap_or_else(RequestId::generate);

    let value = match HeaderValue::from_str(id.as_str()) {
        Ok(value) => value,
        Err(_) => HeaderValue::from_static("invalid"),
    };
    request.headers_mut().insert(X_REQUEST_ID, value.clone());
    request.extensions_mut().insert(id);

    let mut response = next.run(request).await;
    response.headers_mut().insert(X_REQUEST_ID, value);
    response
}

/// Read a whole body, rejecting it with 413 past `limit` bytes.
pub async fn buffer_body(body: Body, limit: usize) -> Result<Bytes, Response> {
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => {
            tracing::warn!(limit, "Request body exceeds limit");
            Err(json_error(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large"))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read request body");
            Err(json_error(StatusCode::BAD_REQUEST, "Failed to read request body"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{middleware, routing::get, Router};
    use tower::ServiceExt;

    async fn echo_id(request: Request<Body>) -> String {
        request.request_id().to_string()
    }

    fn app() -> Router {
        Router::new()
            .route("/", get(echo_id))
            .layer(middleware::from_fn(request_id_middleware))
    }

    #[tokio::test]
    async fn test_generates_hex_id() {
        let response = app()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let header = response.headers()[X_REQUEST_ID].to_str().unwrap().to_string();
        assert_eq!(header.len(), 32);
        assert!(header.chars().all(|c| c.is_ascii_hexdigit()));

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, header.as_bytes());
    }

    #[tokio::test]
    async fn test_echoes_caller_id() {
        let response = app()
            .oneshot(
                Request::get("/")
                    .header(X_REQUEST_ID, "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()[X_REQUEST_ID], "abc-123");
    }

    #[tokio::test]
    async fn test_echoes_long_caller_id() {
        let long_id = "a1".repeat(150);
        let response = app()
            .oneshot(
                Request::get("/")
                    .header(X_REQUEST_ID, long_id.as_str())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()[X_REQUEST_ID], long_id.as_str());
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, long_id.as_bytes());
    }

    #[tokio::test]
    async fn test_blank_caller_id_is_replaced() {
        let response = app()
            .oneshot(
                Request::get("/")
                    .header(X_REQUEST_ID, "   ")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()[X_REQUEST_ID].len(), 32);
    }

    #[tokio::test]
    async fn test_buffer_limit() {
        let accepted = buffer_body(Body::from("12345"), 5).await.ok();
        assert_eq!(accepted, Some(Bytes::from_static(b"12345")));

        match buffer_body(Body::from("123456"), 5).await {
            Err(rejected) => assert_eq!(rejected.status(), StatusCode::PAYLOAD_TOO_LARGE),
            Ok(_) => panic!("oversized body should be rejected"),
        }
    }
}
