//! The reconciliation gateway, the only component that mutates media records.
//!
//! Inbound requests, provider refreshes, backend reports and operator
//! commands all go through [`ReconciliationGateway`]. Each mutation holds the
//! record's lock while it loads, changes and persists the record. Audit
//! events are emitted after the write; outbound network calls are posted to
//! the side-effect dispatcher and never awaited.

mod dispatch;
mod inbound;
mod locks;
mod operator;
mod types;

pub use locks::KeyedLocks;
pub use types::*;

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::audit::{AuditEvent, AuditHandle};
use crate::backend::{FetchBackend, SideEffect, SideEffectHandle};
use crate::media::{MediaKind, MediaRecord, MediaStatus, MediaStore};
use crate::metadata::MetadataProvider;
use crate::metrics;
use crate::queue::{DispatchQueue, QueueEntry, QueueStatus};
use crate::retry::RetryPolicy;
use crate::upstream::RequestService;

/// Upper bound on records loaded by a single scan of the store.
const SCAN_LIMIT: i64 = 10_000;

/// Coordinates the media store, the dispatch queue and the external
/// collaborators. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct ReconciliationGateway {
    store: Arc<dyn MediaStore>,
    queue: Arc<DispatchQueue>,
    policy: RetryPolicy,
    effects: SideEffectHandle,
    backend: Option<Arc<dyn FetchBackend>>,
    upstream: Option<Arc<dyn RequestService>>,
    metadata: Option<Arc<dyn MetadataProvider>>,
    audit: Option<AuditHandle>,
    record_locks: KeyedLocks<i64>,
    title_locks: KeyedLocks<(u64, MediaKind)>,
}

impl ReconciliationGateway {
    pub fn new(
        store: Arc<dyn MediaStore>,
        queue: Arc<DispatchQueue>,
        policy: RetryPolicy,
        effects: SideEffectHandle,
    ) -> Self {
        Self {
            store,
            queue,
            policy,
            effects,
            backend: None,
            upstream: None,
            metadata: None,
            audit: None,
            record_locks: KeyedLocks::new(),
            title_locks: KeyedLocks::new(),
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn FetchBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_upstream(mut self, upstream: Arc<dyn RequestService>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    pub fn with_metadata(mut self, metadata: Arc<dyn MetadataProvider>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_audit(mut self, audit: AuditHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn queue(&self) -> &Arc<DispatchQueue> {
        &self.queue
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    pub fn has_metadata(&self) -> bool {
        self.metadata.is_some()
    }

    fn load(&self, media_id: i64) -> Result<MediaRecord, GatewayError> {
        self.store
            .get(media_id)?
            .ok_or(GatewayError::NotFound(media_id))
    }

    /// Move `record` to `to`, counting the transition and collecting its audit event.
    fn transition(
        record: &mut MediaRecord,
        to: MediaStatus,
        reason: &str,
        events: &mut Vec<AuditEvent>,
    ) -> Result<MediaStatus, GatewayError> {
        let from = record.transition_to(to, Utc::now())?;
        metrics::STATE_TRANSITIONS
            .with_label_values(&[from.as_str(), to.as_str()])
            .inc();
        info!("Media {} {} -> {} ({})", record.id, from, to, reason);
        events.push(AuditEvent::StatusChanged {
            media_id: record.id,
            from_status: from,
            to_status: to,
            reason: Some(reason.to_string()),
        });
        Ok(from)
    }

    /// Persist `record`, then emit the collected events.
    async fn save(
        &self,
        record: &mut MediaRecord,
        events: Vec<AuditEvent>,
    ) -> Result<(), GatewayError> {
        record.updated_at = Utc::now();
        self.store.update(record)?;
        self.emit_all(events).await;
        Ok(())
    }

    async fn emit(&self, event: AuditEvent) {
        if let Some(audit) = &self.audit {
            audit.emit(event).await;
        }
    }

    async fn emit_all(&self, events: Vec<AuditEvent>) {
        for event in events {
            self.emit(event).await;
        }
    }

    fn enqueue(
        &self,
        record: &MediaRecord,
        events: &mut Vec<AuditEvent>,
    ) -> Result<QueueEntry, GatewayError> {
        let entry = self.queue.enqueue(record.id, record.kind)?;
        let position = self
            .queue
            .list(Some(record.kind))
            .iter()
            .position(|e| e.media_id == record.id)
            .unwrap_or(0);
        debug!(
            "Media {} queued at position {} on the {} queue",
            record.id, position, record.kind
        );
        events.push(AuditEvent::Enqueued {
            media_id: record.id,
            kind: record.kind,
            position,
        });
        Ok(entry)
    }

    /// Remove `media_id` from the queue, interrupting the backend when the
    /// entry was processing. Returns `Some(was_processing)` if an entry existed.
    fn dequeue(&self, media_id: i64) -> Option<bool> {
        let entry = self.queue.skip(media_id)?;
        let was_processing = entry.queue_status == QueueStatus::Processing;
        if was_processing {
            self.effects.post(SideEffect::Interrupt { media_id });
        }
        Some(was_processing)
    }

    fn post_mark_available(&self, record: &MediaRecord) {
        if let Some(upstream_media_id) = record.upstream.media_id {
            self.effects.post(SideEffect::MarkAvailable {
                media_id: record.id,
                upstream_media_id,
            });
        }
    }

    fn observe_processing(record: &MediaRecord, result: &str) {
        if let Some(started) = record.processing_started_at {
            let elapsed = (Utc::now() - started).num_milliseconds().max(0) as f64 / 1000.0;
            metrics::PROCESSING_DURATION
                .with_label_values(&[record.kind.as_str(), result])
                .observe(elapsed);
        }
    }
}
