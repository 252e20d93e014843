use std::sync::Arc;

use tokio::sync::mpsc;

use super::{AuditHandle, AuditRecord, AuditStore};

/// Drains the audit channel into a store. Spawn `run` as a background task.
pub struct AuditWriter {
    rx: mpsc::Receiver<AuditRecord>,
    store: Arc<dyn AuditStore>,
}

impl AuditWriter {
    pub async fn run(mut self) {
        tracing::debug!("audit writer started");
        let mut written: u64 = 0;

        while let Some(record) = self.rx.recv().await {
            match self.store.insert(&record) {
                Ok(_) => written += 1,
                Err(e) => tracing::error!(
                    event_type = %record.event_type,
                    media_id = ?record.media_id,
                    error = %e,
                    "failed to persist audit record"
                ),
            }
        }

        tracing::debug!(written, "audit writer stopped");
    }
}

/// Build a connected handle and writer around `store`.
///
/// `buffer_size` bounds the channel; `emit` waits when it is full.
pub fn create_audit_system(
    store: Arc<dyn AuditStore>,
    buffer_size: usize,
) -> (AuditHandle, AuditWriter) {
    let (tx, rx) = mpsc::channel(buffer_size.max(1));
    (AuditHandle::new(tx), AuditWriter { rx, store })
}
