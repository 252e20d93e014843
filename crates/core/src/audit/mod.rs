//! Append-only trail of every state change, written off the request path.

mod events;
mod handle;
mod sqlite;
mod store;
mod writer;

pub use events::{AuditEvent, AuditRecord};
pub use handle::AuditHandle;
pub use sqlite::SqliteAuditStore;
pub use store::{AuditError, AuditFilter, AuditStore, DEFAULT_AUDIT_LIMIT};
pub use writer::{create_audit_system, AuditWriter};
