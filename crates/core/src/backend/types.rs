use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::media::{ExternalIds, MediaKind, MediaRecord};

#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Backend rejected request: {status} - {message}")]
    Rejected { status: u16, message: String },
}

impl BackendError {
    /// Whether the backend could not be engaged at all.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, BackendError::Unreachable(_) | BackendError::Timeout)
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BackendError::Timeout
        } else {
            BackendError::Unreachable(e.to_string())
        }
    }
}

/// Work description handed to the backend on promotion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchPayload {
    /// Unique per hand-off, so the backend can discard duplicates.
    pub job_id: String,
    pub provider_id: u64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default)]
    pub external_ids: ExternalIds,
    /// Seasons still outstanding; empty for movies and whole shows.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub seasons: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_request_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_media_id: Option<u64>,
    pub attempt: u32,
}

impl FetchPayload {
    pub fn for_record(record: &MediaRecord) -> Self {
        let seasons = match record.kind {
            MediaKind::Movie => Vec::new(),
            MediaKind::Show => {
                let outstanding: Vec<u32> = record
                    .seasons
                    .seasons()
                    .filter(|s| !s.outstanding_episodes().is_empty())
                    .map(|s| s.season_number)
                    .collect();
                if outstanding.is_empty() {
                    record.requested_seasons.clone()
                } else {
                    outstanding
                }
            }
        };

        Self {
            job_id: Uuid::new_v4().to_string(),
            provider_id: record.provider_id,
            title: record.title.clone(),
            year: record.year,
            external_ids: record.external_ids.clone(),
            seasons,
            upstream_request_id: record.upstream.request_id,
            upstream_media_id: record.upstream.media_id,
            attempt: record.retry.attempt_count.max(1),
        }
    }
}
