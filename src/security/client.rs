//! Client identity resolution.

use axum::{
    extract::ConnectInfo,
    http::{HeaderMap, Request},
};
use std::net::SocketAddr;

/// Transport-level peer, when the server was started with connect info.
pub fn peer_addr<B>(request: &Request<B>) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// Client identifier: first `X-Forwarded-For` hop, else the peer IP.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty());

    match (forwarded, peer) {
        (Some(hop), _) => hop.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => "unknown".to_string(),
    }
}

/// Resolve the client identifier for a request.
pub fn client_id<B>(request: &Request<B>) -> String {
    client_ip(request.headers(), peer_addr(request))
}
