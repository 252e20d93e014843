//! Types for the background scheduler.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;
use crate::gateway::GatewayError;

/// Errors surfaced by a single scheduler pass.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The gateway rejected or failed the operation.
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// No fetch backend is configured, so nothing can be promoted.
    #[error("no fetch backend configured")]
    NoBackend,

    /// No metadata provider is configured, so subscriptions cannot be checked.
    #[error("no metadata provider configured")]
    NoMetadataProvider,
}

/// Cadence of the background loops.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often each queue tries to promote its head.
    pub promote_interval: Duration,
    /// How often failed records are swept for retry.
    pub sweep_interval: Duration,
    /// Records re-queued per sweep.
    pub sweep_batch_size: usize,
    /// Whether subscribed shows are re-checked.
    pub subscriptions_enabled: bool,
    /// How often subscribed shows are re-checked.
    pub subscription_interval: Duration,
}

impl SchedulerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            promote_interval: Duration::from_secs(config.queue.promote_interval_secs.max(1)),
            sweep_interval: Duration::from_secs(config.retry.sweep_interval_secs.max(1)),
            sweep_batch_size: config.retry.sweep_batch_size,
            subscriptions_enabled: config.subscription.enabled,
            subscription_interval: Duration::from_secs(
                config.subscription.check_interval_secs.max(1),
            ),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Current status of the scheduler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerStatus {
    /// Whether the background loops are running.
    pub running: bool,
    /// Entries handed to the fetch backend since start.
    pub promoted: u64,
    /// When the last retry sweep finished.
    pub last_sweep_at: Option<DateTime<Utc>>,
    /// Records re-queued by the last retry sweep.
    pub last_sweep_requeued: usize,
    /// When subscribed shows were last checked.
    pub last_subscription_check_at: Option<DateTime<Utc>>,
    /// Shows reopened by the last subscription check.
    pub last_subscription_reopened: usize,
}
