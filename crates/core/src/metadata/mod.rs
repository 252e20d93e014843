//! Provider-side season facts: how many episodes exist and how many have aired.

mod trakt;

pub use trakt::TraktClient;

use async_trait::async_trait;
use thiserror::Error;

use crate::events::SeasonCounts;
use crate::media::ExternalIds;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata provider unreachable: {0}")]
    Http(#[from] reqwest::Error),

    #[error("metadata provider rate limit hit")]
    RateLimited,

    #[error("{0} not known to the metadata provider")]
    NotFound(String),

    #[error("metadata provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected metadata response: {0}")]
    Decode(String),

    #[error("metadata provider not configured: {0}")]
    NotConfigured(String),
}

/// Source of provider-reported season counts for shows.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Episode and aired counts for every regular season of a show.
    ///
    /// `external_ids` may carry a provider-native id that avoids a lookup.
    async fn season_summaries(
        &self,
        provider_id: u64,
        external_ids: &ExternalIds,
    ) -> Result<Vec<SeasonCounts>, MetadataError>;
}
