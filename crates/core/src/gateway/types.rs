use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use crate::ledger::LedgerError;
use crate::media::{InvalidTransition, MediaError, MediaKind};
use crate::queue::{QueueError, QueueSnapshot};

/// Errors returned by gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{kind} queue is full ({capacity} entries)")]
    QueueFull { kind: MediaKind, capacity: usize },

    #[error("Media {0} is already queued")]
    AlreadyQueued(i64),

    #[error("Episode {episode} of season {season} is not tracked (aired: {aired})")]
    OutOfRangeEpisode { season: u32, episode: u32, aired: u32 },

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Media record not found: {0}")]
    NotFound(i64),

    #[error("No media record for {kind} {provider_id}")]
    UnknownTitle { provider_id: u64, kind: MediaKind },

    #[error("Fetch backend unreachable: {0}")]
    ExternalBackendUnreachable(String),

    #[error("Store error: {0}")]
    Store(MediaError),
}

impl From<MediaError> for GatewayError {
    fn from(e: MediaError) -> Self {
        match e {
            MediaError::NotFound(id) => GatewayError::NotFound(id),
            other => GatewayError::Store(other),
        }
    }
}

impl From<QueueError> for GatewayError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::QueueFull { kind, capacity } => GatewayError::QueueFull { kind, capacity },
            QueueError::AlreadyQueued { media_id } => GatewayError::AlreadyQueued(media_id),
        }
    }
}

impl From<LedgerError> for GatewayError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::OutOfRangeEpisode {
                season,
                episode,
                aired,
            } => GatewayError::OutOfRangeEpisode {
                season,
                episode,
                aired,
            },
        }
    }
}

impl From<InvalidTransition> for GatewayError {
    fn from(e: InvalidTransition) -> Self {
        GatewayError::InvalidTransition(e.to_string())
    }
}

/// Result of accepting an inbound request.
#[derive(Debug, Clone, Serialize)]
pub struct RequestOutcome {
    pub media_id: i64,
    /// A new record was created.
    pub created: bool,
    /// An ignored record was re-activated.
    pub reactivated: bool,
    pub request_count: u32,
    /// Seasons this request added (all requested seasons for a new record).
    pub affected_seasons: Vec<u32>,
    /// The record is in the dispatch queue after this request.
    pub queued: bool,
    /// Why the record could not be queued, when it was meant to be.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_rejection: Option<String>,
}

/// What a webhook delivery did.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Test,
    Request(RequestOutcome),
    Declined { media_id: Option<i64> },
    Ignored { notification_type: String },
}

/// How the upstream identities for a request were (or were not) found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CorrelationOutcome {
    /// The request fetched by id carried the media id.
    Direct { upstream_media_id: u64 },
    /// A matching request was found among recent requests.
    RecentList {
        request_id: u64,
        upstream_media_id: u64,
    },
    /// Neither lookup produced the identities; the backend is not notified.
    Incomplete,
}

impl CorrelationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrelationOutcome::Direct { .. } => "direct",
            CorrelationOutcome::RecentList { .. } => "recent_list",
            CorrelationOutcome::Incomplete => "incomplete",
        }
    }
}

/// Changes a provider refresh made to a show.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshOutcome {
    pub media_id: i64,
    /// Newly aired episode ordinals per season.
    pub newly_aired: BTreeMap<u32, Vec<u32>>,
    /// Seasons flagged because the aired count went down.
    pub discrepant_seasons: Vec<u32>,
    /// A completed show went back to pending.
    pub reopened: bool,
}

/// Result of skipping a record.
#[derive(Debug, Clone, Serialize)]
pub struct SkipOutcome {
    pub media_id: i64,
    /// An entry was removed from the queue; false means nothing was queued.
    pub removed: bool,
    pub was_processing: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkItemError {
    pub media_id: i64,
    pub error: String,
}

/// Per-item outcome of a bulk command.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkResult {
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<BulkItemError>,
}

impl BulkResult {
    pub(crate) fn record<T>(&mut self, media_id: i64, result: Result<T, GatewayError>) {
        match result {
            Ok(_) => self.succeeded += 1,
            Err(e) => {
                self.failed += 1;
                self.errors.push(BulkItemError {
                    media_id,
                    error: e.to_string(),
                });
            }
        }
    }
}

/// Result of a queue clear.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClearOutcome {
    pub kind: Option<MediaKind>,
    pub cleared: usize,
    pub failed: usize,
}

/// One pass of the retry sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub requeued: usize,
    /// Records found available upstream and completed instead of retried.
    pub already_available: usize,
    pub queue_full: usize,
    /// Pending records admitted to a queue that had turned them away.
    pub readmitted: usize,
    pub errors: usize,
}

/// One pass of the subscription check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubscriptionReport {
    pub checked: usize,
    pub reopened: usize,
    pub errors: usize,
}

/// Aggregate counts for operators.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayStats {
    pub total: i64,
    pub by_status: BTreeMap<String, i64>,
    pub subscribed: i64,
    pub discrepant_seasons: usize,
    pub queue: QueueSnapshot,
}
