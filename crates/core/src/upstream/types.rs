use serde::{Deserialize, Serialize};

use crate::media::MediaKind;

/// Media availability reported by the request service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Unknown,
    Pending,
    Processing,
    PartiallyAvailable,
    Available,
}

impl Availability {
    /// Map the service's numeric media status.
    pub fn from_code(code: u8) -> Self {
        match code {
            2 => Availability::Pending,
            3 => Availability::Processing,
            4 => Availability::PartiallyAvailable,
            5 => Availability::Available,
            _ => Availability::Unknown,
        }
    }

    pub fn is_available(&self) -> bool {
        *self == Availability::Available
    }
}

/// A request as known to the request service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamRequest {
    pub id: u64,
    /// The service's media entry id, needed to notify the fetch backend.
    pub media_id: Option<u64>,
    pub tmdb_id: Option<u64>,
    pub kind: Option<MediaKind>,
    #[serde(default)]
    pub seasons: Vec<u32>,
}

impl UpstreamRequest {
    pub fn matches(&self, provider_id: u64, kind: MediaKind) -> bool {
        self.tmdb_id == Some(provider_id) && self.kind.is_none_or(|k| k == kind)
    }
}
