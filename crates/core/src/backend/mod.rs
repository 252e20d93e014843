//! Fetch automation backend.
//!
//! The backend searches for and acquires content. This crate only hands it
//! work (`enqueue_for_fetch`), interrupts it, and forwards request
//! identities it needs. Best-effort calls go through the side-effect
//! dispatcher so they never sit on a state mutation's critical path.

mod dispatcher;
mod http;
mod types;

pub use dispatcher::{create_side_effect_system, SideEffect, SideEffectDispatcher, SideEffectHandle};
pub use http::HttpFetchBackend;
pub use types::*;

use async_trait::async_trait;

use crate::media::MediaKind;

/// Outbound interface to the fetch backend.
#[async_trait]
pub trait FetchBackend: Send + Sync {
    /// Hand a promoted record to the backend for fetching.
    async fn enqueue_for_fetch(
        &self,
        media_id: i64,
        kind: MediaKind,
        payload: &FetchPayload,
    ) -> Result<(), BackendError>;

    /// Ask the backend to stop working on a record.
    async fn interrupt_processing(&self, media_id: i64) -> Result<(), BackendError>;

    /// Forward request identities resolved after the fact.
    async fn notify_request(
        &self,
        media_id: i64,
        request_id: u64,
        upstream_media_id: u64,
    ) -> Result<(), BackendError>;
}
