//! Prometheus exposition for the server.
//!
//! HTTP metrics are recorded by the request middleware. Record counts and
//! scheduler state are sampled from [`AppState`] on every scrape, and the
//! core lifecycle metrics share the same registry.

use once_cell::sync::Lazy;
use prometheus::{
    core::Collector, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry, TextEncoder,
};
use seerrbridge_core::MediaStatus;

use crate::state::AppState;

const HTTP_LABELS: &[&str] = &["method", "route", "status"];

pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    let server: [Box<dyn Collector>; 5] = [
        Box::new(HTTP_REQUEST_DURATION.clone()),
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()),
        Box::new(MEDIA_BY_STATUS.clone()),
        Box::new(SCHEDULER_RUNNING.clone()),
    ];
    for collector in server.into_iter().chain(seerrbridge_core::metrics::all_metrics()) {
        if let Err(e) = registry.register(collector) {
            tracing::warn!(error = %e, "metric registration failed");
        }
    }
    registry
});

pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "seerrbridge_http_request_duration_seconds",
            "HTTP request latency by route",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        HTTP_LABELS,
    )
    .unwrap()
});

pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("seerrbridge_http_requests_total", "HTTP requests served"),
        HTTP_LABELS,
    )
    .unwrap()
});

pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "seerrbridge_http_requests_in_flight",
        "HTTP requests currently being handled",
    )
    .unwrap()
});

pub static MEDIA_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("seerrbridge_media_by_status", "Tracked media records by status"),
        &["status"],
    )
    .unwrap()
});

pub static SCHEDULER_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "seerrbridge_scheduler_running",
        "1 while the background loops are running",
    )
    .unwrap()
});

/// Render the registry in the Prometheus text format.
pub fn encode_metrics() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer) {
        tracing::warn!(error = %e, "failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Sample gauges that mirror application state.
pub async fn collect_dynamic_metrics(state: &AppState) {
    let scheduler = state.scheduler().status().await;
    SCHEDULER_RUNNING.set(i64::from(scheduler.running));

    match state.gateway().stats() {
        Ok(stats) => {
            for status in MediaStatus::ALL {
                let count = stats.by_status.get(status.as_str()).copied().unwrap_or(0);
                MEDIA_BY_STATUS
                    .with_label_values(&[status.as_str()])
                    .set(count);
            }
        }
        Err(e) => tracing::warn!(error = %e, "failed to sample media counts"),
    }
}
