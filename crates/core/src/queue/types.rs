use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::media::MediaKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Queued,
    Processing,
}

/// A media record's place in a dispatch queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub media_id: i64,
    pub kind: MediaKind,
    pub queue_status: QueueStatus,
    pub queue_added_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("{kind} queue is full ({capacity} entries)")]
    QueueFull { kind: MediaKind, capacity: usize },

    #[error("Media {media_id} is already queued")]
    AlreadyQueued { media_id: i64 },
}

/// Occupancy of one lane.
#[derive(Debug, Clone, Serialize)]
pub struct LaneStatus {
    pub queued: usize,
    pub capacity: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub movie: LaneStatus,
    pub show: LaneStatus,
}
