//! Chaos injection middleware.
//!
//! Two additive delay sources (region simulation, dynamic settings latency)
//! followed by probabilistic failure injection. The plan is drawn from a
//! settings snapshot before any sleep so no lock is held while waiting.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use crate::chaos::regions::{self, RegionProfile};
use crate::chaos::settings::{ChaosSettings, SettingsCache};
use crate::http::response::json_error;
use crate::http::RequestIdExt;
use crate::observability::metrics;

/// What chaos does to a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChaosPlan {
    pub region_delay: Option<Duration>,
    pub dynamic_delay: Option<Duration>,
    pub fail: bool,
}

impl ChaosPlan {
    pub fn total_delay(&self) -> Duration {
        self.region_delay.unwrap_or_default() + self.dynamic_delay.unwrap_or_default()
    }
}

pub struct ChaosInjector {
    settings: Arc<SettingsCache>,
    region: Option<&'static RegionProfile>,
}

impl ChaosInjector {
    pub fn new(settings: Arc<SettingsCache>, simulate_region: Option<&str>) -> Self {
        let region = simulate_region.and_then(regions::lookup);
        if let Some(profile) = region {
            tracing::info!(
                region = profile.name,
                min_ms = profile.min.as_millis() as u64,
                max_ms = profile.max.as_millis() as u64,
                "Region latency simulation enabled"
            );
        }
        Self { settings, region }
    }

    /// Draw a plan for one request.
    pub fn plan<R: Rng + ?Sized>(&self, settings: &ChaosSettings, rng: &mut R) -> ChaosPlan {
        let region_delay = self.region.map(|profile| profile.sample(rng));

        let dynamic_delay = settings
            .latency_range()
            .map(|(min, max)| Duration::from_millis(rng.gen_range(min..=max)));

        let fail = settings.failure_enabled && rng.gen_range(0..100) < settings.failure_rate;

        ChaosPlan {
            region_delay,
            dynamic_delay,
            fail,
        }
    }

    /// Fetch a snapshot and draw a plan with the thread-local RNG.
    pub async fn next_plan(&self) -> ChaosPlan {
        let settings = self.settings.snapshot().await;
        self.plan(&settings, &mut rand::thread_rng())
    }
}

/// Apply latency and failure injection before the request moves on.
pub async fn chaos_middleware(
    State(injector): State<Arc<ChaosInjector>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let plan = injector.next_plan().await;

    if let Some(delay) = plan.region_delay {
        metrics::record_injected_latency("region", delay);
        tokio::time::sleep(delay).await;
    }
    if let Some(delay) = plan.dynamic_delay {
        metrics::record_injected_latency("dynamic", delay);
        tokio::time::sleep(delay).await;
    }

    if plan.fail {
        tracing::warn!(
            request_id = %request.request_id(),
            path = %request.uri().path(),
            "Chaos: injecting failure"
        );
        metrics::record_injected_failure();
        return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Chaos Monkey Struck!");
    }

    next.run(request).await
}
