//! Passive security fuzzer.
//!
//! After a request with query parameters has been answered and its body
//! fully sent, replays it against the primary upstream once per (parameter,
//! payload) pair with the parameter's first value swapped for an attack
//! string. Server errors are
//! reported as potential vulnerabilities. Nothing here ever affects the
//! response the caller receives.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use url::form_urlencoded;

use crate::lifecycle::BackgroundTasks;
use crate::observability::{metrics, AlertSink};
use crate::proxy::Upstream;
use crate::traffic::on_body_sent;

/// Attack strings, in replay order.
pub const FUZZ_PAYLOADS: [&str; 4] = [
    "' OR 1=1--",
    "<script>alert(1)</script>",
    "../../etc/passwd",
    "WAITFOR DELAY '0:0:5'",
];

/// Marker carried by every replayed request.
pub const X_CHAOS_FUZZER: &str = "x-chaos-fuzzer";

/// One replay of the original query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuzzVariant {
    pub param: String,
    pub payload: &'static str,
    pub query: String,
}

/// Build every variant of `query`. Parameter order is preserved and only the
/// first occurrence of the fuzzed parameter is replaced.
pub fn fuzz_variants(query: &str) -> Vec<FuzzVariant> {
    let pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut params: Vec<&str> = Vec::new();
    for (key, _) in &pairs {
        if !params.contains(&key.as_str()) {
            params.push(key);
        }
    }

    let mut variants = Vec::with_capacity(params.len() * FUZZ_PAYLOADS.len());
    for param in params {
        for payload in FUZZ_PAYLOADS {
            let mut serializer = form_urlencoded::Serializer::new(String::new());
            let mut replaced = false;
            for (key, value) in &pairs {
                if !replaced && key == param {
                    serializer.append_pair(key, payload);
                    replaced = true;
                } else {
                    serializer.append_pair(key, value);
                }
            }
            variants.push(FuzzVariant {
                param: param.to_string(),
                payload,
                query: serializer.finish(),
            });
        }
    }
    variants
}

pub struct SecurityFuzzer {
    upstream: Upstream,
    client: reqwest::Client,
    alerts: AlertSink,
    background: BackgroundTasks,
}

impl SecurityFuzzer {
    pub fn new(upstream: Upstream, timeout: Duration, alerts: AlertSink, background: BackgroundTasks) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default fuzz client");
                reqwest::Client::new()
            });
        tracing::warn!(
            upstream = upstream.authority(),
            "Security fuzzing enabled, attack payloads will be sent to the upstream"
        );
        Self {
            upstream,
            client,
            alerts,
            background,
        }
    }

    /// Schedule one fuzz round for a completed request.
    pub fn schedule(self: &Arc<Self>, path: String, query: String, headers: HeaderMap) -> bool {
        let fuzzer = Arc::clone(self);
        self.background.spawn("fuzz", async move {
            fuzzer.run_round(&path, &query, headers).await;
        })
    }

    /// Replay every variant concurrently and report findings.
    pub async fn run_round(&self, path: &str, query: &str, headers: HeaderMap) {
        let headers = replay_headers(headers);
        let probes = fuzz_variants(query)
            .into_iter()
            .map(|variant| self.probe(path, variant, headers.clone()));
        join_all(probes).await;
    }

    async fn probe(&self, path: &str, variant: FuzzVariant, headers: HeaderMap) {
        let url = match self.upstream.target_uri(path, Some(&variant.query)) {
            Ok(uri) => uri.to_string(),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping unbuildable fuzz variant");
                return;
            }
        };

        match self.client.get(&url).headers(headers).send().await {
            Ok(response) if response.status().is_server_error() => {
                let status = response.status().as_u16();
                tracing::warn!(
                    status,
                    url = %url,
                    param = %variant.param,
                    payload = variant.payload,
                    "Potential vulnerability: payload caused server error"
                );
                metrics::record_fuzz("server_error");
                self.alerts
                    .send(&format!(
                        "Potential vulnerability: payload `{}` in parameter `{}` caused {} at {}",
                        variant.payload, variant.param, status, url
                    ))
                    .await;
            }
            Ok(_) => metrics::record_fuzz("ok"),
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Fuzz request failed");
                metrics::record_fuzz("failed");
            }
        }
    }
}

/// Caller headers minus framing and host, plus the fuzzer marker.
fn replay_headers(mut headers: HeaderMap) -> HeaderMap {
    for name in [
        header::HOST,
        header::CONTENT_LENGTH,
        header::TRANSFER_ENCODING,
        header::CONNECTION,
        header::CONTENT_TYPE,
    ] {
        headers.remove(name);
    }
    headers.insert(X_CHAOS_FUZZER, HeaderValue::from_static("true"));
    headers
}

/// Replay requests with attack payloads once they have been answered.
pub async fn fuzz_middleware(
    State(fuzzer): State<Arc<SecurityFuzzer>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    // Never fuzz our own replays.
    if request.headers().contains_key(X_CHAOS_FUZZER) {
        return next.run(request).await;
    }

    let target = request
        .uri()
        .query()
        .filter(|q| !q.is_empty())
        .map(|q| (request.uri().path().to_string(), q.to_string(), request.headers().clone()));

    let response = next.run(request).await;

    match target {
        Some((path, query, headers)) => on_body_sent(response, move || {
            fuzzer.schedule(path, query, headers);
        }),
        None => response,
    }
}
