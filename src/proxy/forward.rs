//! Upstream forwarding.
//!
//! Rewrites a buffered inbound request onto a single http or https upstream:
//! the request
//! path is joined onto the upstream's base path, the query is kept, the
//! `Host` header becomes the upstream's authority and hop-by-hop headers are
//! stripped in both directions.

use axum::{
    body::{Body, Bytes},
    http::{
        header,
        request::Parts,
        uri::{Authority, Scheme},
        HeaderMap, HeaderName, HeaderValue, Request, Uri,
    },
    response::Response,
};
use hyper::body::Incoming;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

pub type HttpClient = Client<HttpsConnector<HttpConnector>, Body>;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid upstream url {url:?}: {reason}")]
    InvalidUpstream { url: String, reason: String },

    #[error("failed to build upstream request: {0}")]
    Request(#[from] axum::http::Error),

    #[error("upstream transport failure: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),

    #[error("failed to set up upstream TLS: {0}")]
    Tls(#[from] rustls::Error),
}

const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Build the pooled client used for all upstream traffic, plain or TLS.
pub fn build_client(connect_timeout: Duration) -> Result<HttpClient, ProxyError> {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(connect_timeout));
    connector.set_nodelay(true);
    connector.enforce_http(false);

    let connector = HttpsConnectorBuilder::new()
        .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())?
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .wrap_connector(connector);
    Ok(Client::builder(TokioExecutor::new()).build(connector))
}

/// A single forwarding target.
#[derive(Debug, Clone)]
pub struct Upstream {
    scheme: Scheme,
    authority: Authority,
    base_path: String,
    host: HeaderValue,
}

impl Upstream {
    /// Parse an `http(s)://host[:port][/base]` URL.
    pub fn parse(url: &str) -> Result<Self, ProxyError> {
        let invalid = |reason: &str| ProxyError::InvalidUpstream {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let uri: Uri = url.parse().map_err(|_| invalid("not a valid URI"))?;
        let scheme = match uri.scheme_str() {
            Some("http") => Scheme::HTTP,
            Some("https") => Scheme::HTTPS,
            Some(_) => return Err(invalid("only http and https upstreams are supported")),
            None => return Err(invalid("missing scheme")),
        };
        let authority = uri.authority().cloned().ok_or_else(|| invalid("missing host"))?;
        let host = HeaderValue::from_str(authority.as_str()).map_err(|_| invalid("host is not a valid header"))?;

        Ok(Self {
            scheme,
            base_path: uri.path().trim_end_matches('/').to_string(),
            authority,
            host,
        })
    }

    pub fn authority(&self) -> &str {
        self.authority.as_str()
    }

    /// Absolute URI on this upstream for an inbound path and query.
    pub fn target_uri(&self, path: &str, query: Option<&str>) -> Result<Uri, ProxyError> {
        let mut path_and_query = join_path(&self.base_path, path);
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            path_and_query.push('?');
            path_and_query.push_str(query);
        }
        Ok(Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()?)
    }

    /// Build the outbound request for one attempt.
    pub fn build_request(
        &self,
        parts: &Parts,
        body: Bytes,
        client_ip: Option<IpAddr>,
    ) -> Result<Request<Body>, ProxyError> {
        let uri = self.target_uri(parts.uri.path(), parts.uri.query())?;

        let mut request = Request::builder()
            .method(parts.method.clone())
            .uri(uri)
            .body(Body::from(body))?;

        let headers = request.headers_mut();
        headers.extend(parts.headers.clone());
        strip_hop_by_hop(headers);
        headers.remove(header::CONTENT_LENGTH);
        headers.insert(header::HOST, self.host.clone());

        if let Some(ip) = client_ip {
            append_forwarded_for(headers, ip);
        }

        Ok(request)
    }

    /// Send a request and hand the upstream response back as a streaming body.
    pub async fn send(&self, client: &HttpClient, request: Request<Body>) -> Result<Response, ProxyError> {
        let response: hyper::Response<Incoming> = client.request(request).await?;
        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

/// Join an upstream base path and a request path with exactly one slash.
pub fn join_path(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    match (base.is_empty(), path.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{}", path),
        (false, true) => base.to_string(),
        (false, false) => format!("{}/{}", base, path),
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named by Connection are hop-by-hop as well.
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, ip: IpAddr) {
    let value = match headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        Some(prior) if !prior.trim().is_empty() => format!("{}, {}", prior, ip),
        _ => ip.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert("x-forwarded-for", value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    fn parts(uri: &str) -> Parts {
        let (parts, _) = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::HOST, "proxy.local")
            .header(header::CONNECTION, "keep-alive, x-secret-hop")
            .header("x-secret-hop", "1")
            .header("x-custom", "kept")
            .header(header::CONTENT_LENGTH, "3")
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("", "/users"), "/users");
        assert_eq!(join_path("/api/", "/users"), "/api/users");
        assert_eq!(join_path("/api", ""), "/api");
        assert_eq!(join_path("", ""), "/");
    }

    #[test]
    fn test_parse_rejects_unsupported_targets() {
        assert!(Upstream::parse("http://backend:8080").is_ok());
        assert!(Upstream::parse("https://backend").is_ok());
        assert!(Upstream::parse("ftp://backend").is_err());
        assert!(Upstream::parse("backend:8080").is_err());
        assert!(Upstream::parse("not a url").is_err());
    }

    #[test]
    fn test_request_rewrite() {
        let upstream = Upstream::parse("http://backend:9000/base").unwrap();
        let request = upstream
            .build_request(
                &parts("/users?id=1"),
                Bytes::from_static(b"abc"),
                Some("10.1.2.3".parse().unwrap()),
            )
            .unwrap();

        assert_eq!(request.uri().to_string(), "http://backend:9000/base/users?id=1");
        assert_eq!(request.method(), Method::POST);

        let headers = request.headers();
        assert_eq!(headers[header::HOST], "backend:9000");
        assert_eq!(headers["x-custom"], "kept");
        assert_eq!(headers["x-forwarded-for"], "10.1.2.3");
        assert!(headers.get(header::CONNECTION).is_none());
        assert!(headers.get("x-secret-hop").is_none());
        assert!(headers.get(header::CONTENT_LENGTH).is_none());
    }

    #[test]
    fn test_https_upstream_keeps_scheme() {
        let upstream = Upstream::parse("https://api.example.com/v2").unwrap();
        assert_eq!(upstream.authority(), "api.example.com");

        let uri = upstream.target_uri("/orders", Some("page=2")).unwrap();
        assert_eq!(uri.to_string(), "https://api.example.com/v2/orders?page=2");

        let request = upstream
            .build_request(&parts("/orders"), Bytes::new(), None)
            .unwrap();
        assert_eq!(request.uri().scheme_str(), Some("https"));
        assert_eq!(request.headers()[header::HOST], "api.example.com");
    }

    #[test]
    fn test_client_builds_with_tls() {
        assert!(build_client(Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_forwarded_for_is_appended() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("1.1.1.1"));
        append_forwarded_for(&mut headers, "2.2.2.2".parse().unwrap());
        assert_eq!(headers["x-forwarded-for"], "1.1.1.1, 2.2.2.2");
    }
}
