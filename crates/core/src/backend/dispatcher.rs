//! Fire-and-forget delivery of outbound side effects.
//!
//! State mutations post a [`SideEffect`] and return immediately. A single
//! [`SideEffectDispatcher`] task performs the network calls; failures are
//! logged and counted, never reported back.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::FetchBackend;
use crate::metrics;
use crate::upstream::RequestService;

/// An outbound call that must not block the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    /// Stop the backend working on a record.
    Interrupt { media_id: i64 },
    /// Forward request identities resolved by correlation.
    NotifyRequest {
        media_id: i64,
        request_id: u64,
        upstream_media_id: u64,
    },
    /// Tell the request service the title is available.
    MarkAvailable { media_id: i64, upstream_media_id: u64 },
}

impl SideEffect {
    pub fn operation(&self) -> &'static str {
        match self {
            SideEffect::Interrupt { .. } => "interrupt",
            SideEffect::NotifyRequest { .. } => "notify_request",
            SideEffect::MarkAvailable { .. } => "mark_available",
        }
    }
}

/// Cheaply cloneable sender for side effects.
#[derive(Clone)]
pub struct SideEffectHandle {
    tx: mpsc::Sender<SideEffect>,
}

impl SideEffectHandle {
    pub fn new(tx: mpsc::Sender<SideEffect>) -> Self {
        Self { tx }
    }

    /// Queue a side effect without waiting. Returns false if it was dropped.
    pub fn post(&self, effect: SideEffect) -> bool {
        let operation = effect.operation();
        match self.tx.try_send(effect) {
            Ok(()) => true,
            Err(e) => {
                warn!("Dropping {} side effect: {}", operation, e);
                metrics::BACKEND_CALLS
                    .with_label_values(&[operation, "dropped"])
                    .inc();
                false
            }
        }
    }
}

/// Background task performing side effects in the order they were posted.
pub struct SideEffectDispatcher {
    rx: mpsc::Receiver<SideEffect>,
    backend: Option<Arc<dyn FetchBackend>>,
    upstream: Option<Arc<dyn RequestService>>,
}

impl SideEffectDispatcher {
    pub fn new(
        rx: mpsc::Receiver<SideEffect>,
        backend: Option<Arc<dyn FetchBackend>>,
        upstream: Option<Arc<dyn RequestService>>,
    ) -> Self {
        Self {
            rx,
            backend,
            upstream,
        }
    }

    /// Run until every handle is dropped.
    pub async fn run(mut self) {
        info!("Side-effect dispatcher started");

        while let Some(effect) = self.rx.recv().await {
            self.handle(effect).await;
        }

        info!("Side-effect dispatcher shutting down");
    }

    /// Perform every effect already posted without waiting for more.
    /// Returns how many were handled.
    pub async fn drain(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(effect) = self.rx.try_recv() {
            self.handle(effect).await;
            handled += 1;
        }
        handled
    }

    async fn handle(&self, effect: SideEffect) {
        let operation = effect.operation();
        let outcome = match self.perform(&effect).await {
            Ok(true) => "ok",
            Ok(false) => {
                debug!("No collaborator configured for {}, skipping", operation);
                "skipped"
            }
            Err(e) => {
                warn!("Side effect {:?} failed: {}", effect, e);
                "error"
            }
        };
        metrics::BACKEND_CALLS
            .with_label_values(&[operation, outcome])
            .inc();
    }

    /// Ok(false) when the target collaborator is not configured.
    async fn perform(&self, effect: &SideEffect) -> Result<bool, String> {
        match *effect {
            SideEffect::Interrupt { media_id } => match &self.backend {
                Some(backend) => backend
                    .interrupt_processing(media_id)
                    .await
                    .map(|_| true)
                    .map_err(|e| e.to_string()),
                None => Ok(false),
            },
            SideEffect::NotifyRequest {
                media_id,
                request_id,
                upstream_media_id,
            } => match &self.backend {
                Some(backend) => backend
                    .notify_request(media_id, request_id, upstream_media_id)
                    .await
                    .map(|_| true)
                    .map_err(|e| e.to_string()),
                None => Ok(false),
            },
            SideEffect::MarkAvailable {
                upstream_media_id, ..
            } => match &self.upstream {
                Some(upstream) => upstream
                    .mark_available(upstream_media_id)
                    .await
                    .map(|_| true)
                    .map_err(|e| e.to_string()),
                None => Ok(false),
            },
        }
    }
}

/// Create a handle and the dispatcher that serves it.
///
/// Spawn the dispatcher with `tokio::spawn(dispatcher.run())`.
pub fn create_side_effect_system(
    backend: Option<Arc<dyn FetchBackend>>,
    upstream: Option<Arc<dyn RequestService>>,
    buffer_size: usize,
) -> (SideEffectHandle, SideEffectDispatcher) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (
        SideEffectHandle::new(tx),
        SideEffectDispatcher::new(rx, backend, upstream),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockFetchBackend, MockRequestService};

    #[tokio::test]
    async fn test_dispatcher_delivers_in_order() {
        let backend = Arc::new(MockFetchBackend::new());
        let upstream = Arc::new(MockRequestService::new());
        let (handle, dispatcher) = create_side_effect_system(
            Some(backend.clone() as Arc<dyn FetchBackend>),
            Some(upstream.clone() as Arc<dyn RequestService>),
            8,
        );
        let task = tokio::spawn(dispatcher.run());

        assert!(handle.post(SideEffect::Interrupt { media_id: 1 }));
        assert!(handle.post(SideEffect::NotifyRequest {
            media_id: 2,
            request_id: 10,
            upstream_media_id: 20,
        }));
        assert!(handle.post(SideEffect::MarkAvailable {
            media_id: 2,
            upstream_media_id: 20,
        }));
        drop(handle);
        task.await.unwrap();

        assert_eq!(backend.interrupts().await, vec![1]);
        assert_eq!(backend.notifications().await, vec![(2, 10, 20)]);
        assert_eq!(upstream.marked_available().await, vec![20]);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_dispatcher() {
        let backend = Arc::new(MockFetchBackend::new());
        backend.set_unreachable(true).await;
        let (handle, dispatcher) =
            create_side_effect_system(Some(backend.clone() as Arc<dyn FetchBackend>), None, 8);
        let task = tokio::spawn(dispatcher.run());

        handle.post(SideEffect::Interrupt { media_id: 1 });
        handle.post(SideEffect::MarkAvailable {
            media_id: 1,
            upstream_media_id: 5,
        });
        drop(handle);

        let result = tokio::time::timeout(std::time::Duration::from_secs(1), task).await;
        assert!(result.is_ok());
        assert!(backend.interrupts().await.is_empty());
    }

    #[tokio::test]
    async fn test_drain_handles_only_posted_effects() {
        let backend = Arc::new(MockFetchBackend::new());
        let (handle, mut dispatcher) =
            create_side_effect_system(Some(backend.clone() as Arc<dyn FetchBackend>), None, 8);

        assert_eq!(dispatcher.drain().await, 0);
        handle.post(SideEffect::Interrupt { media_id: 3 });
        handle.post(SideEffect::Interrupt { media_id: 4 });
        assert_eq!(dispatcher.drain().await, 2);
        assert_eq!(backend.interrupts().await, vec![3, 4]);
    }

    #[test]
    fn test_post_on_full_channel_drops() {
        let (tx, _rx) = mpsc::channel(1);
        let handle = SideEffectHandle::new(tx);
        assert!(handle.post(SideEffect::Interrupt { media_id: 1 }));
        assert!(!handle.post(SideEffect::Interrupt { media_id: 2 }));
    }
}
