//! Media record storage trait and types.

use thiserror::Error;

use super::{MediaKind, MediaRecord, MediaStatus};

/// Error type for media storage operations.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Media record not found: {0}")]
    NotFound(i64),

    #[error("Media record already exists for {kind} {provider_id}")]
    Duplicate { provider_id: u64, kind: MediaKind },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for MediaError {
    fn from(e: rusqlite::Error) -> Self {
        MediaError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for MediaError {
    fn from(e: serde_json::Error) -> Self {
        MediaError::Serialization(e.to_string())
    }
}

/// Filter for querying media records.
#[derive(Debug, Clone, Default)]
pub struct MediaFilter {
    pub status: Option<MediaStatus>,
    pub kind: Option<MediaKind>,
    pub subscribed: Option<bool>,
    pub limit: i64,
    pub offset: i64,
}

impl MediaFilter {
    /// Create a new filter with defaults.
    pub fn new() -> Self {
        Self {
            limit: 100,
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: MediaStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_kind(mut self, kind: MediaKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_subscribed(mut self, subscribed: bool) -> Self {
        self.subscribed = Some(subscribed);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Trait for media record storage backends.
pub trait MediaStore: Send + Sync {
    /// Insert a new record and return it with its assigned id.
    fn insert(&self, record: &MediaRecord) -> Result<MediaRecord, MediaError>;

    fn get(&self, id: i64) -> Result<Option<MediaRecord>, MediaError>;

    /// Look up by the dedup key.
    fn find_by_provider(
        &self,
        provider_id: u64,
        kind: MediaKind,
    ) -> Result<Option<MediaRecord>, MediaError>;

    /// List records, oldest request first.
    fn list(&self, filter: &MediaFilter) -> Result<Vec<MediaRecord>, MediaError>;

    fn count(&self, filter: &MediaFilter) -> Result<i64, MediaError>;

    /// Replace the stored row with `record`.
    fn update(&self, record: &MediaRecord) -> Result<(), MediaError>;

    /// Permanently delete a record with its season ledgers.
    fn delete(&self, id: i64) -> Result<MediaRecord, MediaError>;
}
