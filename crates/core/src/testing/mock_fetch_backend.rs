//! Mock fetch backend for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::backend::{BackendError, FetchBackend, FetchPayload};
use crate::media::MediaKind;

/// A recorded hand-off for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedFetch {
    pub media_id: i64,
    pub kind: MediaKind,
    pub payload: FetchPayload,
}

/// Mock implementation of the FetchBackend trait.
///
/// Provides controllable behavior for testing:
/// - Track hand-offs, interrupts and notifications
/// - Simulate an unreachable backend
/// - Inject a one-shot error
///
/// # Example
///
/// ```rust,ignore
/// let backend = MockFetchBackend::new();
/// backend.set_unreachable(true).await;
///
/// // promotion now fails and the entry stays queued
/// ```
#[derive(Debug, Default)]
pub struct MockFetchBackend {
    fetches: Arc<RwLock<Vec<RecordedFetch>>>,
    interrupts: Arc<RwLock<Vec<i64>>>,
    notifications: Arc<RwLock<Vec<(i64, u64, u64)>>>,
    unreachable: Arc<RwLock<bool>>,
    /// If set, the next operation will fail with this error.
    next_error: Arc<RwLock<Option<BackendError>>>,
}

impl MockFetchBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail as if the backend were down.
    pub async fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.write().await = unreachable;
    }

    /// Fail the next call with `error`.
    pub async fn set_next_error(&self, error: BackendError) {
        *self.next_error.write().await = Some(error);
    }

    /// All hand-offs received, oldest first.
    pub async fn fetches(&self) -> Vec<RecordedFetch> {
        self.fetches.read().await.clone()
    }

    /// Media ids handed off, oldest first.
    pub async fn fetched_ids(&self) -> Vec<i64> {
        self.fetches.read().await.iter().map(|f| f.media_id).collect()
    }

    pub async fn interrupts(&self) -> Vec<i64> {
        self.interrupts.read().await.clone()
    }

    /// `(media_id, request_id, upstream_media_id)` triples received.
    pub async fn notifications(&self) -> Vec<(i64, u64, u64)> {
        self.notifications.read().await.clone()
    }

    async fn check_failure(&self) -> Result<(), BackendError> {
        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }
        if *self.unreachable.read().await {
            return Err(BackendError::Unreachable("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl FetchBackend for MockFetchBackend {
    async fn enqueue_for_fetch(
        &self,
        media_id: i64,
        kind: MediaKind,
        payload: &FetchPayload,
    ) -> Result<(), BackendError> {
        self.check_failure().await?;
        self.fetches.write().await.push(RecordedFetch {
            media_id,
            kind,
            payload: payload.clone(),
        });
        Ok(())
    }

    async fn interrupt_processing(&self, media_id: i64) -> Result<(), BackendError> {
        self.check_failure().await?;
        self.interrupts.write().await.push(media_id);
        Ok(())
    }

    async fn notify_request(
        &self,
        media_id: i64,
        request_id: u64,
        upstream_media_id: u64,
    ) -> Result<(), BackendError> {
        self.check_failure().await?;
        self.notifications
            .write()
            .await
            .push((media_id, request_id, upstream_media_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaRecord;

    #[tokio::test]
    async fn test_records_fetches() {
        let backend = MockFetchBackend::new();
        let record = MediaRecord::new(603, MediaKind::Movie, "The Matrix");
        backend
            .enqueue_for_fetch(1, MediaKind::Movie, &FetchPayload::for_record(&record))
            .await
            .unwrap();
        assert_eq!(backend.fetched_ids().await, vec![1]);
    }

    #[tokio::test]
    async fn test_next_error_is_one_shot() {
        let backend = MockFetchBackend::new();
        backend.set_next_error(BackendError::Timeout).await;
        assert!(backend.interrupt_processing(1).await.is_err());
        assert!(backend.interrupt_processing(1).await.is_ok());
        assert_eq!(backend.interrupts().await, vec![1]);
    }

    #[tokio::test]
    async fn test_unreachable_until_restored() {
        let backend = MockFetchBackend::new();
        backend.set_unreachable(true).await;
        let err = backend.interrupt_processing(1).await.unwrap_err();
        assert!(err.is_unreachable());

        backend.set_unreachable(false).await;
        assert!(backend.interrupt_processing(1).await.is_ok());
    }
}
