//! Pulseboard — Binary Entrypoint
//! Boots the Axum HTTP server, wiring routes, shared state, and middleware.
//!
//! See `README.md` for quickstart and `DESIGN.md` for architecture notes.

use std::net::SocketAddr;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pulseboard::api::{create_router, AppState};
use pulseboard::config::AppConfig;
use pulseboard::metrics::Metrics;

/// Compact tracing to stdout. `RUST_LOG` wins when set.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pulseboard=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    init_tracing();

    let config = AppConfig::load_default().context("failed to load dashboard config")?;
    let port = config.server.port;

    let state = AppState::from_config(config);

    // Recorder before the sweep, so the sweep's counters are not lost to the
    // no-op recorder.
    let metrics = Metrics::init(state.cache.ttl().as_millis() as u64);

    // Repair pass before the first request can touch the store.
    state.store.startup_sweep();

    // Background evening schedule for the configured region.
    state.scheduler.clone().spawn();

    let router = create_router(state).merge(metrics.router());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "pulseboard listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server error")?;

    Ok(())
}
