//! Chaos Proxy
//!
//! A reverse proxy that forwards traffic to a backend while deliberately
//! perturbing it, and keeps serving from a ghost cache when the backend dies.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                     CHAOS PROXY                       │
//!   Client Request    │  ┌────────┐  ┌─────────┐  ┌─────────┐  ┌──────────┐   │
//!   ──────────────────┼─▶│ panic  │─▶│ req id  │─▶│ traffic │─▶│ request  │   │
//!                     │  │barrier │  │powered- │  │   tee   │  │   log    │   │
//!                     │  └────────┘  │   by    │  └─────────┘  └────┬─────┘   │
//!                     │              └─────────┘                    ▼         │
//!                     │  ┌────────┐  ┌─────────┐  ┌─────────┐  ┌──────────┐   │
//!                     │  │ fuzzer │◀─│  chaos  │◀─│   ip    │◀─│   rate   │   │
//!                     │  │post-hoc│  │injector │  │ filter  │  │  limit   │   │
//!                     │  └───┬────┘  └─────────┘  └─────────┘  └──────────┘   │
//!                     │      ▼                                                │
//!                     │  ┌────────┐  ┌─────────┐        ┌───────────────┐     │
//!                     │  │ canary │─▶│ reverse │───────▶│ primary       │─────┼──▶ Backend
//!                     │  │ split  │  │  proxy  │        │ upstream      │     │
//!                     │  └───┬────┘  └────┬────┘        └───────────────┘     │
//!                     │      ▼            ▼ transport failure                 │
//!                     │   canary     ghost cache ──────▶ Redis ◀── settings,  │
//!                     │   upstream   (or 502)                      blocklist, │
//!                     │                                            traffic    │
//!                     └──────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;

use chaos_proxy::config::load_config;
use chaos_proxy::http::HttpServer;
use chaos_proxy::lifecycle::{signals, startup, Shutdown};
use chaos_proxy::observability::{init_tracing, metrics};

#[derive(Parser, Debug)]
#[command(name = "chaos-proxy", version, about = "Chaos-engineering reverse proxy")]
struct Args {
    /// Path to a TOML configuration file (falls back to CHAOS_CONFIG).
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config_path = args
        .config
        .or_else(|| std::env::var_os("CHAOS_CONFIG").map(PathBuf::from));

    let config = load_config(config_path.as_deref())?;
    init_tracing(&config.observability.log_level, config.is_production());

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        env = %config.app_env,
        "chaos-proxy starting"
    );
    tracing::info!(
        bind_address = %config.listener.bind_address,
        target = %config.upstream.target_url,
        store = %config.store.address,
        canary = %config.canary.target_url,
        canary_weight = config.canary.weight,
        region = ?config.chaos.simulate_region,
        "Configuration loaded"
    );

    let store = startup::open_store(&config.store)?;
    startup::probe_store(&store, Duration::from_secs(5)).await;

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config, store)?;

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        signals::wait_for_signal().await;
        shutdown.trigger();
    });

    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
