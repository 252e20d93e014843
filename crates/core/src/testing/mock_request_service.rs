//! Mock upstream request service for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::media::MediaKind;
use crate::upstream::{Availability, RequestService, UpstreamError, UpstreamRequest};

/// A recorded call for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedUpstreamCall {
    GetRequest { request_id: u64 },
    ListRecent { take: u32 },
    CheckAvailability { provider_id: u64, kind: MediaKind },
    MarkAvailable { media_id: u64 },
}

/// Mock implementation of the RequestService trait.
///
/// Requests are looked up by id; `list_recent_requests` returns the
/// configured recent list newest first. Unknown titles are `Unknown`
/// availability.
#[derive(Debug, Default)]
pub struct MockRequestService {
    requests: Arc<RwLock<HashMap<u64, UpstreamRequest>>>,
    recent: Arc<RwLock<Vec<UpstreamRequest>>>,
    availability: Arc<RwLock<HashMap<(u64, MediaKind), Availability>>>,
    marked: Arc<RwLock<Vec<u64>>>,
    calls: Arc<RwLock<Vec<RecordedUpstreamCall>>>,
    unreachable: Arc<RwLock<bool>>,
    /// If set, the next operation will fail with this error.
    next_error: Arc<RwLock<Option<UpstreamError>>>,
}

impl MockRequestService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `get_request(request.id)` return this request.
    pub async fn add_request(&self, request: UpstreamRequest) {
        self.requests.write().await.insert(request.id, request);
    }

    /// Append to the recent-requests list.
    pub async fn add_recent(&self, request: UpstreamRequest) {
        self.recent.write().await.push(request);
    }

    pub async fn set_availability(&self, provider_id: u64, kind: MediaKind, a: Availability) {
        self.availability.write().await.insert((provider_id, kind), a);
    }

    pub async fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.write().await = unreachable;
    }

    pub async fn set_next_error(&self, error: UpstreamError) {
        *self.next_error.write().await = Some(error);
    }

    /// Upstream media ids marked available, oldest first.
    pub async fn marked_available(&self) -> Vec<u64> {
        self.marked.read().await.clone()
    }

    pub async fn calls(&self) -> Vec<RecordedUpstreamCall> {
        self.calls.read().await.clone()
    }

    async fn record(&self, call: RecordedUpstreamCall) -> Result<(), UpstreamError> {
        self.calls.write().await.push(call);
        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }
        if *self.unreachable.read().await {
            return Err(UpstreamError::ApiError {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RequestService for MockRequestService {
    async fn get_request(&self, request_id: u64) -> Result<UpstreamRequest, UpstreamError> {
        self.record(RecordedUpstreamCall::GetRequest { request_id })
            .await?;
        self.requests
            .read()
            .await
            .get(&request_id)
            .cloned()
            .ok_or_else(|| UpstreamError::NotFound(format!("Request {}", request_id)))
    }

    async fn list_recent_requests(
        &self,
        take: u32,
    ) -> Result<Vec<UpstreamRequest>, UpstreamError> {
        self.record(RecordedUpstreamCall::ListRecent { take }).await?;
        let recent = self.recent.read().await;
        Ok(recent.iter().rev().take(take as usize).cloned().collect())
    }

    async fn check_availability(
        &self,
        provider_id: u64,
        kind: MediaKind,
    ) -> Result<Availability, UpstreamError> {
        self.record(RecordedUpstreamCall::CheckAvailability { provider_id, kind })
            .await?;
        Ok(self
            .availability
            .read()
            .await
            .get(&(provider_id, kind))
            .copied()
            .unwrap_or(Availability::Unknown))
    }

    async fn mark_available(&self, media_id: u64) -> Result<(), UpstreamError> {
        self.record(RecordedUpstreamCall::MarkAvailable { media_id })
            .await?;
        self.marked.write().await.push(media_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: u64, tmdb: u64) -> UpstreamRequest {
        UpstreamRequest {
            id,
            media_id: Some(id * 10),
            tmdb_id: Some(tmdb),
            kind: Some(MediaKind::Show),
            seasons: vec![1],
        }
    }

    #[tokio::test]
    async fn test_get_request_found_and_missing() {
        let service = MockRequestService::new();
        service.add_request(request(1, 1399)).await;

        assert_eq!(service.get_request(1).await.unwrap().media_id, Some(10));
        assert!(matches!(
            service.get_request(2).await,
            Err(UpstreamError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_recent_is_newest_first() {
        let service = MockRequestService::new();
        service.add_recent(request(1, 1)).await;
        service.add_recent(request(2, 2)).await;

        let recent = service.list_recent_requests(10).await.unwrap();
        assert_eq!(recent[0].id, 2);
        assert_eq!(recent[1].id, 1);
    }

    #[tokio::test]
    async fn test_unreachable_fails_every_call() {
        let service = MockRequestService::new();
        service.set_unreachable(true).await;
        assert!(service.check_availability(1, MediaKind::Movie).await.is_err());
        assert!(service.mark_available(1).await.is_err());
        assert!(service.marked_available().await.is_empty());
        assert_eq!(service.calls().await.len(), 2);
    }
}
