use chrono::{DateTime, Utc};
use thiserror::Error;

use super::AuditRecord;
use crate::media::MediaKind;

/// Page size when a query does not set one.
pub const DEFAULT_AUDIT_LIMIT: i64 = 100;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Audit database error: {0}")]
    Database(String),

    #[error("Audit serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for AuditError {
    fn from(e: rusqlite::Error) -> Self {
        AuditError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for AuditError {
    fn from(e: serde_json::Error) -> Self {
        AuditError::Serialization(e.to_string())
    }
}

/// Which audit records to return. Results are ordered newest first.
#[derive(Debug, Clone)]
pub struct AuditFilter {
    pub media_id: Option<i64>,
    /// Match any of these event types; empty matches all.
    pub event_types: Vec<String>,
    pub kind: Option<MediaKind>,
    pub user_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for AuditFilter {
    fn default() -> Self {
        Self {
            media_id: None,
            event_types: Vec::new(),
            kind: None,
            user_id: None,
            since: None,
            until: None,
            limit: DEFAULT_AUDIT_LIMIT,
            offset: 0,
        }
    }
}

impl AuditFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded about one media record.
    pub fn for_media(media_id: i64) -> Self {
        Self {
            media_id: Some(media_id),
            ..Self::default()
        }
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_types.push(event_type.into());
        self
    }

    pub fn with_kind(mut self, kind: MediaKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Records at or after `at`.
    pub fn since(mut self, at: DateTime<Utc>) -> Self {
        self.since = Some(at);
        self
    }

    /// Records at or before `at`.
    pub fn until(mut self, at: DateTime<Utc>) -> Self {
        self.until = Some(at);
        self
    }

    pub fn page(mut self, limit: i64, offset: i64) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }
}

/// Persistence for the audit trail.
pub trait AuditStore: Send + Sync {
    /// Insert a record, returning the assigned id.
    fn insert(&self, record: &AuditRecord) -> Result<i64, AuditError>;

    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError>;

    /// Number of matching records, ignoring `limit` and `offset`.
    fn count(&self, filter: &AuditFilter) -> Result<i64, AuditError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_pages_by_default_limit() {
        let filter = AuditFilter::new();
        assert_eq!(filter.limit, DEFAULT_AUDIT_LIMIT);
        assert_eq!(filter.offset, 0);
        assert!(filter.event_types.is_empty());
    }

    #[test]
    fn test_event_types_accumulate() {
        let filter = AuditFilter::for_media(3)
            .with_event_type("enqueued")
            .with_event_type("promoted")
            .page(10, 20);
        assert_eq!(filter.media_id, Some(3));
        assert_eq!(filter.event_types, vec!["enqueued", "promoted"]);
        assert_eq!((filter.limit, filter.offset), (10, 20));
    }
}
