use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::media::{MediaKind, MediaStatus};

/// Audit event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    // System events
    ServiceStarted {
        version: String,
        config_hash: String,
    },
    ServiceStopped {
        reason: String,
    },

    // Record lifecycle
    RequestReceived {
        media_id: i64,
        provider_id: u64,
        kind: MediaKind,
        /// Whether this request created the record (false for repeats)
        created: bool,
        request_count: u32,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        seasons: Vec<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        requested_by: Option<String>,
    },
    StatusChanged {
        media_id: i64,
        from_status: MediaStatus,
        to_status: MediaStatus,
        reason: Option<String>,
    },
    MediaDeleted {
        media_id: i64,
        previous_status: MediaStatus,
    },
    IgnoreToggled {
        media_id: i64,
        ignored: bool,
    },
    SubscriptionToggled {
        media_id: i64,
        active: bool,
    },

    // Episode ledger
    EpisodesMarked {
        media_id: i64,
        season: u32,
        episodes: Vec<u32>,
        /// "confirmed", "failed" or "season_complete"
        outcome: String,
    },
    EpisodesAired {
        media_id: i64,
        season: u32,
        episodes: Vec<u32>,
    },
    DiscrepancyDetected {
        media_id: i64,
        season: u32,
        recorded_aired: u32,
        reported_aired: u32,
    },
    DiscrepancyAcknowledged {
        media_id: i64,
        season: u32,
    },

    // Queue
    Enqueued {
        media_id: i64,
        kind: MediaKind,
        position: usize,
    },
    Promoted {
        media_id: i64,
        kind: MediaKind,
    },
    Skipped {
        media_id: i64,
        was_processing: bool,
    },
    QueueCleared {
        kind: Option<MediaKind>,
        cleared: usize,
    },

    // Retry
    RetryScheduled {
        media_id: i64,
        attempt_count: u32,
    },
    Retriggered {
        media_id: i64,
        previous_status: MediaStatus,
    },

    // Upstream correlation
    CorrelationAttempted {
        media_id: i64,
        request_id: u64,
        /// "direct", "recent_list" or "incomplete"
        outcome: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        upstream_media_id: Option<u64>,
    },
}

impl AuditEvent {
    /// Returns the event type as a string for storage
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ServiceStarted { .. } => "service_started",
            Self::ServiceStopped { .. } => "service_stopped",
            Self::RequestReceived { .. } => "request_received",
            Self::StatusChanged { .. } => "status_changed",
            Self::MediaDeleted { .. } => "media_deleted",
            Self::IgnoreToggled { .. } => "ignore_toggled",
            Self::SubscriptionToggled { .. } => "subscription_toggled",
            Self::EpisodesMarked { .. } => "episodes_marked",
            Self::EpisodesAired { .. } => "episodes_aired",
            Self::DiscrepancyDetected { .. } => "discrepancy_detected",
            Self::DiscrepancyAcknowledged { .. } => "discrepancy_acknowledged",
            Self::Enqueued { .. } => "enqueued",
            Self::Promoted { .. } => "promoted",
            Self::Skipped { .. } => "skipped",
            Self::QueueCleared { .. } => "queue_cleared",
            Self::RetryScheduled { .. } => "retry_scheduled",
            Self::Retriggered { .. } => "retriggered",
            Self::CorrelationAttempted { .. } => "correlation_attempted",
        }
    }

    /// Extract media_id if this event concerns a single record
    pub fn media_id(&self) -> Option<i64> {
        match self {
            Self::RequestReceived { media_id, .. }
            | Self::StatusChanged { media_id, .. }
            | Self::MediaDeleted { media_id, .. }
            | Self::IgnoreToggled { media_id, .. }
            | Self::SubscriptionToggled { media_id, .. }
            | Self::EpisodesMarked { media_id, .. }
            | Self::EpisodesAired { media_id, .. }
            | Self::DiscrepancyDetected { media_id, .. }
            | Self::DiscrepancyAcknowledged { media_id, .. }
            | Self::Enqueued { media_id, .. }
            | Self::Promoted { media_id, .. }
            | Self::Skipped { media_id, .. }
            | Self::RetryScheduled { media_id, .. }
            | Self::Retriggered { media_id, .. }
            | Self::CorrelationAttempted { media_id, .. } => Some(*media_id),
            Self::ServiceStarted { .. }
            | Self::ServiceStopped { .. }
            | Self::QueueCleared { .. } => None,
        }
    }

    /// Extract the requesting user, if the event carries one
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::RequestReceived { requested_by, .. } => requested_by.as_deref(),
            _ => None,
        }
    }

    /// Media kind named by the event, used to filter by queue lane
    pub fn media_kind(&self) -> Option<MediaKind> {
        match self {
            Self::RequestReceived { kind, .. }
            | Self::Enqueued { kind, .. }
            | Self::Promoted { kind, .. } => Some(*kind),
            Self::QueueCleared { kind, .. } => *kind,
            _ => None,
        }
    }
}

/// A stored audit record with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Store-assigned id; 0 until inserted
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub media_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MediaKind>,
    pub user_id: Option<String>,
    pub data: AuditEvent,
}

impl AuditRecord {
    /// Index an event for storage; the queryable columns come from the event itself.
    pub fn from_event(timestamp: DateTime<Utc>, event: AuditEvent) -> Self {
        Self {
            id: 0,
            timestamp,
            event_type: event.event_type().to_string(),
            media_id: event.media_id(),
            kind: event.media_kind(),
            user_id: event.user_id().map(String::from),
            data: event,
        }
    }
}
