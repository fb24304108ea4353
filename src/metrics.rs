// src/metrics.rs
//! Prometheus recorder setup and the `/metrics` route. Installed once in the
//! binary; library tests run without a recorder and the macros no-op.

use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Initialize Prometheus recorder and expose a static gauge for the feed
    /// cache TTL.
    pub fn init(feed_cache_ttl_ms: u64) -> Self {
        // Use default buckets to avoid API differences across crate versions.
        let builder = PrometheusBuilder::new();

        let handle = builder
            .install_recorder()
            .expect("prometheus: install recorder");

        ensure_metrics_described();
        // Static gauge with current TTL (absolute TTL, no sliding refresh)
        gauge!("feed_cache_ttl_ms").set(feed_cache_ttl_ms as f64);

        Self { handle }
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

/// One-time registration of series descriptions so /metrics carries help text.
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "feed_fetch_errors_total",
            "Feed source fetch/parse errors, labeled by source."
        );
        describe_counter!(
            "summary_runs_total",
            "Summary pipeline runs that got past the lock."
        );
        describe_counter!(
            "summary_skips_total",
            "Summary pipeline runs skipped because every section was empty."
        );
        describe_counter!(
            "summary_failures_total",
            "Summary generations that exhausted their retry budget."
        );
        describe_counter!("store_saves_total", "Summaries written to the store.");
        describe_counter!(
            "store_rejects_total",
            "Store saves rejected as past-date duplicates."
        );
        describe_counter!(
            "repair_dropped_total",
            "Keys and entries discarded by the store repair sweep."
        );
        describe_counter!(
            "admin_denied_total",
            "Admin endpoint requests refused by the IP allow-list."
        );
        describe_gauge!(
            "summary_last_run_ts",
            "Unix timestamp of the last completed summary run."
        );
        describe_gauge!("feed_cache_ttl_ms", "Configured feed cache TTL.");
    });
}
