//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Inbound requests and lifecycle transitions
//! - Dispatch queue occupancy and rejections
//! - Retry sweeps and correlation attempts
//! - Calls to the fetch backend and upstream services

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts};

// =============================================================================
// Gateway
// =============================================================================

/// Inbound media requests by kind and whether they created a record.
pub static REQUESTS_RECEIVED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "seerrbridge_requests_received_total",
            "Total inbound media requests",
        ),
        &["kind", "result"], // "created", "repeated", "reactivated"
    )
    .unwrap()
});

/// Lifecycle transitions by source and target status.
pub static STATE_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "seerrbridge_state_transitions_total",
            "Total media record status transitions",
        ),
        &["from", "to"],
    )
    .unwrap()
});

/// Seasons flagged because the provider reported fewer aired episodes.
pub static DISCREPANCIES_DETECTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "seerrbridge_discrepancies_detected_total",
        "Total season discrepancies flagged during reconciliation",
    )
    .unwrap()
});

/// Correlation attempts by outcome.
pub static CORRELATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "seerrbridge_correlation_total",
            "Best-effort upstream request correlation attempts",
        ),
        &["outcome"], // "direct", "recent_list", "incomplete"
    )
    .unwrap()
});

// =============================================================================
// Dispatch Queue
// =============================================================================

/// Entries waiting in each queue.
pub static QUEUE_DEPTH: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("seerrbridge_queue_depth", "Queued entries per media kind"),
        &["kind"],
    )
    .unwrap()
});

/// Rejected enqueue attempts.
pub static QUEUE_REJECTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "seerrbridge_queue_rejections_total",
            "Enqueue attempts rejected by the dispatch queue",
        ),
        &["kind", "reason"], // "queue_full", "already_queued"
    )
    .unwrap()
});

/// Time an entry spent processing before it was released.
pub static PROCESSING_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "seerrbridge_processing_duration_seconds",
            "Time from promotion to completion or failure",
        )
        .buckets(vec![10.0, 30.0, 60.0, 180.0, 600.0, 1800.0, 3600.0]),
        &["kind", "result"],
    )
    .unwrap()
});

// =============================================================================
// Retry
// =============================================================================

/// Records examined by the retry sweep, by outcome.
pub static RETRY_SWEEP: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "seerrbridge_retry_sweep_total",
            "Failed records handled by the retry sweep",
        ),
        &["outcome"], // "requeued", "already_available", "queue_full", "error"
    )
    .unwrap()
});

// =============================================================================
// External services
// =============================================================================

/// Calls to the fetch backend and upstream services.
pub static BACKEND_CALLS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "seerrbridge_backend_calls_total",
            "Outbound calls to external collaborators",
        ),
        &["operation", "outcome"],
    )
    .unwrap()
});

/// All core metrics, for registration with a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(REQUESTS_RECEIVED.clone()),
        Box::new(STATE_TRANSITIONS.clone()),
        Box::new(DISCREPANCIES_DETECTED.clone()),
        Box::new(CORRELATIONS.clone()),
        Box::new(QUEUE_DEPTH.clone()),
        Box::new(QUEUE_REJECTIONS.clone()),
        Box::new(PROCESSING_DURATION.clone()),
        Box::new(RETRY_SWEEP.clone()),
        Box::new(BACKEND_CALLS.clone()),
    ]
}
