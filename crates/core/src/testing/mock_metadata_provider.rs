//! Mock metadata provider for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::events::SeasonCounts;
use crate::media::ExternalIds;
use crate::metadata::{MetadataError, MetadataProvider};

/// Mock implementation of the MetadataProvider trait, keyed by TMDB id.
#[derive(Debug, Default)]
pub struct MockMetadataProvider {
    seasons: Arc<RwLock<HashMap<u64, Vec<SeasonCounts>>>>,
    queries: Arc<RwLock<Vec<u64>>>,
    /// If set, the next operation will fail with this error.
    next_error: Arc<RwLock<Option<MetadataError>>>,
}

impl MockMetadataProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the season counts reported for a show.
    pub async fn set_seasons(&self, provider_id: u64, seasons: Vec<SeasonCounts>) {
        self.seasons.write().await.insert(provider_id, seasons);
    }

    pub async fn set_next_error(&self, error: MetadataError) {
        *self.next_error.write().await = Some(error);
    }

    /// Provider ids queried, oldest first.
    pub async fn queries(&self) -> Vec<u64> {
        self.queries.read().await.clone()
    }
}

#[async_trait]
impl MetadataProvider for MockMetadataProvider {
    async fn season_summaries(
        &self,
        provider_id: u64,
        _external_ids: &ExternalIds,
    ) -> Result<Vec<SeasonCounts>, MetadataError> {
        self.queries.write().await.push(provider_id);
        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }
        self.seasons
            .read()
            .await
            .get(&provider_id)
            .cloned()
            .ok_or_else(|| MetadataError::NotFound(format!("show {}", provider_id)))
    }
}
