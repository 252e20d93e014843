//! Trakt API client.
//!
//! Trakt identifies apps by a client id sent in `trakt-api-key`; all calls
//! pin `trakt-api-version: 2`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::debug;

use super::{MetadataError, MetadataProvider};
use crate::config::MetadataConfig;
use crate::events::SeasonCounts;
use crate::media::ExternalIds;

const API_VERSION: &str = "2";

/// Trakt API client.
pub struct TraktClient {
    client: Client,
    base_url: String,
    client_id: String,
}

#[derive(Debug, Deserialize)]
struct TraktIds {
    trakt: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TraktShow {
    ids: TraktIds,
}

#[derive(Debug, Deserialize)]
struct TraktSearchResult {
    show: Option<TraktShow>,
}

#[derive(Debug, Deserialize)]
struct TraktSeason {
    number: u32,
    #[serde(default)]
    episode_count: Option<u32>,
    #[serde(default)]
    aired_episodes: Option<u32>,
}

impl TraktClient {
    pub fn new(config: &MetadataConfig) -> Result<Self, MetadataError> {
        if config.client_id.is_empty() {
            return Err(MetadataError::NotConfigured(
                "Trakt client id is required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(u64::from(config.timeout_secs)))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
        })
    }

    async fn get(&self, path: &str) -> Result<Response, MetadataError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Trakt request: {}", url);

        let response = self
            .client
            .get(&url)
            .header("Content-Type", "application/json")
            .header("trakt-api-key", &self.client_id)
            .header("trakt-api-version", API_VERSION)
            .send()
            .await?;

        let status = response.status();
        if status == 404 {
            return Err(MetadataError::NotFound(path.to_string()));
        }
        if status == 429 {
            return Err(MetadataError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MetadataError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Resolve the Trakt show id for a TMDB id.
    async fn resolve_show_id(&self, tmdb_id: u64) -> Result<String, MetadataError> {
        let response = self
            .get(&format!("/search/tmdb/{}?type=show", tmdb_id))
            .await?;
        let results: Vec<TraktSearchResult> = response.json().await.map_err(|e| {
            MetadataError::Decode(format!("Failed to parse search response: {}", e))
        })?;

        results
            .into_iter()
            .filter_map(|r| r.show.and_then(|s| s.ids.trakt))
            .next()
            .map(|id| id.to_string())
            .ok_or_else(|| MetadataError::NotFound(format!("show with tmdb id {}", tmdb_id)))
    }
}

/// Regular seasons only; specials (season 0) are not tracked.
fn to_counts(seasons: Vec<TraktSeason>) -> Vec<SeasonCounts> {
    seasons
        .into_iter()
        .filter(|s| s.number > 0)
        .map(|s| SeasonCounts {
            season_number: s.number,
            episode_count: s.episode_count.unwrap_or(0),
            aired_episodes: s.aired_episodes.unwrap_or(0),
        })
        .collect()
}

#[async_trait]
impl MetadataProvider for TraktClient {
    async fn season_summaries(
        &self,
        provider_id: u64,
        external_ids: &ExternalIds,
    ) -> Result<Vec<SeasonCounts>, MetadataError> {
        let show_id = match external_ids.trakt.as_ref().or(external_ids.imdb.as_ref()) {
            Some(id) => id.clone(),
            None => self.resolve_show_id(provider_id).await?,
        };

        let path = format!(
            "/shows/{}/seasons?extended=full",
            urlencoding::encode(&show_id)
        );
        let response = self.get(&path).await?;
        let seasons: Vec<TraktSeason> = response.json().await.map_err(|e| {
            MetadataError::Decode(format!("Failed to parse seasons response: {}", e))
        })?;

        Ok(to_counts(seasons))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(client_id: &str) -> MetadataConfig {
        MetadataConfig {
            client_id: client_id.to_string(),
            base_url: "https://api.trakt.tv/".to_string(),
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_new_requires_client_id() {
        assert!(matches!(
            TraktClient::new(&config("")),
            Err(MetadataError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_base_url_trimmed() {
        let client = TraktClient::new(&config("abc")).unwrap();
        assert_eq!(client.base_url, "https://api.trakt.tv");
    }

    #[test]
    fn test_season_parsing_skips_specials() {
        let json = serde_json::json!([
            { "number": 0, "episode_count": 3, "aired_episodes": 3 },
            { "number": 1, "episode_count": 10, "aired_episodes": 10 },
            { "number": 2, "episode_count": 8, "aired_episodes": 2 }
        ]);
        let seasons: Vec<TraktSeason> = serde_json::from_value(json).unwrap();
        let counts = to_counts(seasons);

        assert_eq!(counts.len(), 2);
        assert_eq!(counts[0].season_number, 1);
        assert_eq!(counts[1].episode_count, 8);
        assert_eq!(counts[1].aired_episodes, 2);
    }

    #[test]
    fn test_season_parsing_missing_counts() {
        let json = serde_json::json!([{ "number": 3 }]);
        let seasons: Vec<TraktSeason> = serde_json::from_value(json).unwrap();
        let counts = to_counts(seasons);
        assert_eq!(counts[0].episode_count, 0);
        assert_eq!(counts[0].aired_episodes, 0);
    }
}
