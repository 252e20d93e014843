//! Overseerr/Jellyseerr API client.
//!
//! Both services share the `/api/v1` surface and authenticate with an
//! `X-Api-Key` header.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use tracing::debug;

use super::{Availability, RequestService, UpstreamError, UpstreamRequest};
use crate::config::UpstreamConfig;
use crate::media::MediaKind;

/// Overseerr/Jellyseerr API client.
pub struct OverseerrClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OverseerrClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        if config.api_key.is_empty() {
            return Err(UpstreamError::NotConfigured(
                "request service API key is required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(u64::from(config.timeout_secs)))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}/api/v1{}", self.base_url, path))
            .header("X-Api-Key", &self.api_key)
    }

    async fn check(response: Response, what: String) -> Result<Response, UpstreamError> {
        let status = response.status();
        if status == 404 {
            return Err(UpstreamError::NotFound(what));
        }
        if status == 401 || status == 403 {
            return Err(UpstreamError::NotConfigured(
                "request service rejected the API key".to_string(),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(response)
    }
}

#[derive(Debug, Deserialize)]
struct ApiMedia {
    id: Option<u64>,
    #[serde(rename = "tmdbId")]
    tmdb_id: Option<u64>,
    #[serde(rename = "mediaType")]
    media_type: Option<String>,
    status: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct ApiSeason {
    #[serde(rename = "seasonNumber")]
    season_number: u32,
}

#[derive(Debug, Deserialize)]
struct ApiRequest {
    id: u64,
    #[serde(rename = "type")]
    request_type: Option<String>,
    media: Option<ApiMedia>,
    #[serde(default)]
    seasons: Vec<ApiSeason>,
}

impl From<ApiRequest> for UpstreamRequest {
    fn from(r: ApiRequest) -> Self {
        let kind = r
            .request_type
            .as_deref()
            .or(r.media.as_ref().and_then(|m| m.media_type.as_deref()))
            .and_then(|t| t.parse().ok());
        UpstreamRequest {
            id: r.id,
            media_id: r.media.as_ref().and_then(|m| m.id),
            tmdb_id: r.media.as_ref().and_then(|m| m.tmdb_id),
            kind,
            seasons: r.seasons.into_iter().map(|s| s.season_number).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiRequestPage {
    results: Vec<ApiRequest>,
}

#[derive(Debug, Deserialize)]
struct ApiTitle {
    #[serde(rename = "mediaInfo")]
    media_info: Option<ApiMedia>,
}

#[async_trait]
impl RequestService for OverseerrClient {
    async fn get_request(&self, request_id: u64) -> Result<UpstreamRequest, UpstreamError> {
        debug!("Fetching upstream request {}", request_id);
        let response = self.get(&format!("/request/{}", request_id)).send().await?;
        let response = Self::check(response, format!("Request {}", request_id)).await?;
        let request: ApiRequest = response.json().await.map_err(|e| {
            UpstreamError::ParseError(format!("Failed to parse request response: {}", e))
        })?;
        Ok(request.into())
    }

    async fn list_recent_requests(
        &self,
        take: u32,
    ) -> Result<Vec<UpstreamRequest>, UpstreamError> {
        debug!("Listing {} most recent upstream requests", take);
        let response = self
            .get("/request")
            .query(&[
                ("take", take.to_string()),
                ("filter", "all".to_string()),
                ("sort", "added".to_string()),
            ])
            .send()
            .await?;
        let response = Self::check(response, "Request list".to_string()).await?;
        let page: ApiRequestPage = response.json().await.map_err(|e| {
            UpstreamError::ParseError(format!("Failed to parse request list: {}", e))
        })?;
        Ok(page.results.into_iter().map(Into::into).collect())
    }

    async fn check_availability(
        &self,
        provider_id: u64,
        kind: MediaKind,
    ) -> Result<Availability, UpstreamError> {
        let segment = match kind {
            MediaKind::Movie => "movie",
            MediaKind::Show => "tv",
        };
        let path = format!("/{}/{}", urlencoding::encode(segment), provider_id);
        let response = self.get(&path).send().await?;
        let response = Self::check(response, format!("{} {}", kind, provider_id)).await?;
        let title: ApiTitle = response.json().await.map_err(|e| {
            UpstreamError::ParseError(format!("Failed to parse title response: {}", e))
        })?;
        Ok(title
            .media_info
            .and_then(|m| m.status)
            .map(Availability::from_code)
            .unwrap_or(Availability::Unknown))
    }

    async fn mark_available(&self, media_id: u64) -> Result<(), UpstreamError> {
        debug!("Marking upstream media {} available", media_id);
        let response = self
            .client
            .post(format!("{}/api/v1/media/{}/available", self.base_url, media_id))
            .header("X-Api-Key", &self.api_key)
            .json(&serde_json::json!({ "is4k": false }))
            .send()
            .await?;
        Self::check(response, format!("Media {}", media_id)).await?;
        Ok(())
    }
}
