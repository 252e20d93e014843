//! Upstream request service (Overseerr/Jellyseerr).
//!
//! Used as a read source for request identities and availability, and as
//! the target of "mark available" notifications.

mod overseerr;
mod types;

pub use overseerr::OverseerrClient;
pub use types::{Availability, UpstreamRequest};

use async_trait::async_trait;
use thiserror::Error;

use crate::media::MediaKind;

/// Errors that can occur when talking to the request service.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Client not configured: {0}")]
    NotConfigured(String),
}

/// Read access to the request service plus availability updates.
#[async_trait]
pub trait RequestService: Send + Sync {
    /// Fetch a single request by its id.
    async fn get_request(&self, request_id: u64) -> Result<UpstreamRequest, UpstreamError>;

    /// Most recently added requests, newest first.
    async fn list_recent_requests(&self, take: u32)
        -> Result<Vec<UpstreamRequest>, UpstreamError>;

    /// Availability of a title as the request service sees it.
    async fn check_availability(
        &self,
        provider_id: u64,
        kind: MediaKind,
    ) -> Result<Availability, UpstreamError>;

    /// Mark the service's media entry as available.
    async fn mark_available(&self, media_id: u64) -> Result<(), UpstreamError>;
}
