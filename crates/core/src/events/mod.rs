//! Inbound event shapes and their normalization.
//!
//! Webhook payloads from the request service vary between versions and
//! templates. They are parsed into [`WebhookPayload`], classified into a
//! [`WebhookEvent`], and requests are reduced to one canonical
//! [`InboundRequest`].

mod seasons;
mod webhook;

pub use seasons::parse_season_list;
pub use webhook::{
    ExtraItem, FlexibleId, WebhookEvent, WebhookExtra, WebhookMedia, WebhookPayload,
    WebhookRequest,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::media::{ExternalIds, MediaKind};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("Media information is missing in the payload")]
    MissingMedia,

    #[error("Invalid identifier for {field}: {value}")]
    InvalidId { field: &'static str, value: String },

    #[error("Unsupported media type: {0}")]
    UnsupportedKind(String),

    #[error("Season {season}: {field} {value} exceeds {max}")]
    CountOutOfRange {
        season: u32,
        field: &'static str,
        value: u32,
        max: u32,
    },
}

/// Upper bound on provider episode counts for a single season.
pub const MAX_EPISODES_PER_SEASON: u32 = 10_000;

/// Canonical new-request event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundRequest {
    pub provider_id: u64,
    pub kind: MediaKind,
    /// Requested seasons; empty means the whole show (or a movie).
    #[serde(default)]
    pub seasons: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_request_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_media_id: Option<u64>,
    #[serde(default)]
    pub external_ids: ExternalIds,
}

impl InboundRequest {
    pub fn new(provider_id: u64, kind: MediaKind) -> Self {
        Self {
            provider_id,
            kind,
            seasons: Vec::new(),
            title: None,
            year: None,
            requested_by: None,
            upstream_request_id: None,
            upstream_media_id: None,
            external_ids: ExternalIds::default(),
        }
    }

    pub fn with_seasons(mut self, seasons: Vec<u32>) -> Self {
        self.seasons = seasons;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_upstream_request(mut self, request_id: u64) -> Self {
        self.upstream_request_id = Some(request_id);
        self
    }
}

/// Provider counts for one season.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonCounts {
    pub season_number: u32,
    pub episode_count: u32,
    pub aired_episodes: u32,
}

impl SeasonCounts {
    /// Reject counts no real season has.
    pub fn validate(&self) -> Result<(), EventError> {
        for (field, value) in [
            ("episode_count", self.episode_count),
            ("aired_episodes", self.aired_episodes),
        ] {
            if value > MAX_EPISODES_PER_SEASON {
                return Err(EventError::CountOutOfRange {
                    season: self.season_number,
                    field,
                    value,
                    max: MAX_EPISODES_PER_SEASON,
                });
            }
        }
        Ok(())
    }
}

/// Fresh provider metadata for a title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRefresh {
    pub provider_id: u64,
    pub kind: MediaKind,
    pub seasons: Vec<SeasonCounts>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(episode_count: u32, aired_episodes: u32) -> SeasonCounts {
        SeasonCounts {
            season_number: 1,
            episode_count,
            aired_episodes,
        }
    }

    #[test]
    fn test_season_counts_within_bounds() {
        assert!(counts(0, 0).validate().is_ok());
        assert!(counts(24, 10).validate().is_ok());
        assert!(counts(MAX_EPISODES_PER_SEASON, MAX_EPISODES_PER_SEASON)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_season_counts_rejects_huge_values() {
        let err = counts(u32::MAX, 1).validate().unwrap_err();
        assert!(matches!(
            err,
            EventError::CountOutOfRange {
                field: "episode_count",
                ..
            }
        ));

        let err = counts(10, MAX_EPISODES_PER_SEASON + 1).validate().unwrap_err();
        assert!(matches!(
            err,
            EventError::CountOutOfRange {
                field: "aired_episodes",
                ..
            }
        ));
    }
}
