use chrono::Utc;
use tokio::sync::mpsc;

use super::{AuditEvent, AuditRecord};

/// Sending side of the audit channel.
///
/// Events are stamped and indexed here, so the timestamp reflects when the
/// state change happened rather than when the writer got to it. Clones share
/// the channel; the writer stops once every clone is dropped.
#[derive(Clone)]
pub struct AuditHandle {
    tx: mpsc::Sender<AuditRecord>,
}

impl AuditHandle {
    pub fn new(tx: mpsc::Sender<AuditRecord>) -> Self {
        Self { tx }
    }

    /// Record `event`. Waits for buffer space; a closed channel is logged and ignored.
    pub async fn emit(&self, event: AuditEvent) {
        let record = AuditRecord::from_event(Utc::now(), event);
        let event_type = record.event_type.clone();
        if self.tx.send(record).await.is_err() {
            tracing::warn!(event_type = %event_type, "audit writer gone, dropping event");
        }
    }
}
