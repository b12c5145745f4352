//! HTTP server setup and pipeline composition.
//!
//! # Responsibilities
//! - Build every pipeline component from configuration
//! - Wire the middleware stages in their fixed order
//! - Serve with connect info so stages can see the peer address
//! - Run background maintenance (rate-limiter sweep) until shutdown
//!
//! # Pipeline
//! ```text
//! panic barrier (outermost)
//!   → request id → X-Powered-By → traffic log → request log
//!   → rate limit → IP filter → chaos → security fuzzer
//!   → router: /healthz, /api/blocked-ips
//!             /* → canary split → reverse proxy (ghost fallback)
//! ```
//! Axum applies the last `.layer` call outermost, so layers below are added
//! innermost first.

use axum::{
    middleware::{from_fn, from_fn_with_state},
    response::Response,
    routing::{any, get},
    Router,
};
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::catch_panic::CatchPanicLayer;

use crate::chaos::{chaos_middleware, ChaosInjector, SettingsCache};
use crate::config::ProxyConfig;
use crate::http::handlers::{blocked_ips, healthz};
use crate::http::request::request_id_middleware;
use crate::http::response::{panic_response, powered_by_middleware};
use crate::lifecycle::{shutdown, BackgroundTasks};
use crate::observability::{log_requests, AlertSink};
use crate::proxy::{
    build_client, canary_middleware, proxy_handler, CanaryRouter, GhostFallback, ProxyError,
    ReverseProxy, Upstream,
};
use crate::resilience::RetryPolicy;
use crate::security::{
    fuzz_middleware, ip_filter_middleware, rate_limit_middleware, IpFilter, SecurityFuzzer,
    SlidingWindowLimiter,
};
use crate::store::SharedStore;
use crate::traffic::{traffic_middleware, TrafficLogger};

/// HTTP server for the chaos proxy.
pub struct HttpServer {
    router: Router,
    limiter: Option<Arc<SlidingWindowLimiter>>,
    config: ProxyConfig,
}

impl HttpServer {
    /// Build every component and compose the pipeline.
    pub fn new(config: ProxyConfig, store: SharedStore) -> Result<Self, ProxyError> {
        let upstream = Upstream::parse(&config.upstream.target_url)?;
        let client = build_client(Duration::from_secs(config.upstream.connect_timeout_secs))?;
        let background = BackgroundTasks::new(config.background.max_tasks);
        let max_body_size = config.security.max_body_size;

        let proxy = Arc::new(ReverseProxy::new(
            client.clone(),
            upstream.clone(),
            RetryPolicy::new(&config.retries),
            GhostFallback::new(store.clone(), background.clone()),
            max_body_size,
        ));
        let canary = Arc::new(CanaryRouter::new(&config.canary, client, max_body_size));

        let settings = Arc::new(SettingsCache::new(
            store.clone(),
            Duration::from_millis(config.chaos.settings_ttl_ms),
        ));
        let injector = Arc::new(ChaosInjector::new(settings, config.chaos.simulate_region.as_deref()));

        let limiter = config
            .rate_limit
            .enabled
            .then(|| Arc::new(SlidingWindowLimiter::from_config(&config.rate_limit)));

        let fuzzer = config.security.fuzzing_enabled.then(|| {
            Arc::new(SecurityFuzzer::new(
                upstream.clone(),
                Duration::from_secs(config.security.fuzz_timeout_secs),
                AlertSink::new(&config.alert.webhook_url),
                background.clone(),
            ))
        });

        let traffic = Arc::new(TrafficLogger::new(
            store.clone(),
            background,
            &config.traffic,
            &config.security,
        ));

        // Terminal routes. Canary applies to proxied paths only.
        let proxied = Router::new()
            .route("/", any(proxy_handler))
            .route("/{*path}", any(proxy_handler))
            .with_state(proxy)
            .layer(from_fn_with_state(canary, canary_middleware));

        let api = Router::new()
            .route("/healthz", get(healthz))
            .route("/api/blocked-ips", get(blocked_ips))
            .with_state(store.clone());

        let mut router = api.merge(proxied);

        if let Some(fuzzer) = fuzzer {
            router = router.layer(from_fn_with_state(fuzzer, fuzz_middleware));
        }
        // Rejections happen before any latency or failure is injected.
        router = router
            .layer(from_fn_with_state(injector, chaos_middleware))
            .layer(from_fn_with_state(IpFilter::new(store), ip_filter_middleware));
        if let Some(limiter) = &limiter {
            router = router.layer(from_fn_with_state(limiter.clone(), rate_limit_middleware));
        }
        let router = router
            .layer(from_fn(log_requests))
            .layer(from_fn_with_state(traffic, traffic_middleware))
            .layer(from_fn(powered_by_middleware))
            .layer(from_fn(request_id_middleware))
            .layer(CatchPanicLayer::custom(handle_panic));

        tracing::info!(
            upstream = upstream.authority(),
            rate_limit = config.rate_limit.enabled,
            fuzzing = config.security.fuzzing_enabled,
            traffic_log = config.traffic.enabled,
            "Pipeline assembled"
        );

        Ok(Self {
            router,
            limiter,
            config,
        })
    }

    /// The composed router, for driving the pipeline without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let sweeper = self
            .limiter
            .as_ref()
            .map(|limiter| limiter.spawn_sweeper(shutdown.resubscribe()));

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown::wait(shutdown))
            .await?;

        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic payload"
    };
    panic_response(message)
}
