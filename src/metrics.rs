use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and describe tracker metrics.
    /// Fails when a recorder is already installed in this process.
    pub fn init(poll_interval_secs: u64) -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        describe_gauge!("tracker_subjects", "Subjects currently tracked");
        describe_gauge!(
            "tracker_poll_interval_secs",
            Unit::Seconds,
            "Configured scheduler interval"
        );
        describe_counter!("tracker_cycles_total", "Scheduled cycles run");
        describe_counter!(
            "tracker_cycles_skipped_total",
            "Ticks skipped because a cycle was still running"
        );
        describe_counter!(
            "tracker_refresh_failures_total",
            "Per-subject refresh failures inside a cycle"
        );
        describe_counter!(
            "tracker_articles_added_total",
            "Articles newly merged into timelines"
        );
        describe_counter!(
            "tracker_retrieval_fallback_total",
            "Fetches answered with placeholder articles"
        );
        describe_counter!("tracker_alerts_published_total", "Alerts fanned out");
        describe_counter!(
            "tracker_alert_delivery_failures_total",
            "Listener deliveries that failed or timed out"
        );
        describe_histogram!(
            "tracker_fetch_ms",
            Unit::Milliseconds,
            "Latency of one source fetch"
        );

        gauge!("tracker_poll_interval_secs").set(poll_interval_secs as f64);

        Ok(Self { handle })
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
