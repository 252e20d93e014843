//! HTTP client for the fetch automation service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Serialize;
use tracing::debug;

use super::{BackendError, FetchBackend, FetchPayload};
use crate::config::BackendConfig;
use crate::media::MediaKind;

/// Talks to the automation service's job API.
pub struct HttpFetchBackend {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct EnqueueBody<'a> {
    media_id: i64,
    kind: MediaKind,
    #[serde(flatten)]
    payload: &'a FetchPayload,
}

#[derive(Serialize)]
struct NotifyBody {
    media_id: i64,
    request_id: u64,
    upstream_media_id: u64,
}

impl HttpFetchBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(u64::from(config.timeout_secs)))
            .build()
            .map_err(|e| BackendError::Unreachable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Response, BackendError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Backend request: POST {}", url);

        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl FetchBackend for HttpFetchBackend {
    async fn enqueue_for_fetch(
        &self,
        media_id: i64,
        kind: MediaKind,
        payload: &FetchPayload,
    ) -> Result<(), BackendError> {
        let body = EnqueueBody {
            media_id,
            kind,
            payload,
        };
        self.post("/api/jobs", &body).await?;
        Ok(())
    }

    async fn interrupt_processing(&self, media_id: i64) -> Result<(), BackendError> {
        self.post(
            &format!("/api/jobs/{}/interrupt", media_id),
            &serde_json::json!({}),
        )
        .await?;
        Ok(())
    }

    async fn notify_request(
        &self,
        media_id: i64,
        request_id: u64,
        upstream_media_id: u64,
    ) -> Result<(), BackendError> {
        let body = NotifyBody {
            media_id,
            request_id,
            upstream_media_id,
        };
        self.post("/api/requests/notify", &body).await?;
        Ok(())
    }
}
