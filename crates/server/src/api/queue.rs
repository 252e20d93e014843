//! Dispatch queue and retry API handlers.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use seerrbridge_core::gateway::ClearOutcome;
use seerrbridge_core::queue::{QueueEntry, QueueSnapshot};
use seerrbridge_core::MediaKind;
use std::sync::Arc;

use super::error::{bad_request, gateway_error, ApiError};
use super::media::MediaResponse;
use crate::state::AppState;

/// Query parameters selecting one queue
#[derive(Debug, Deserialize)]
pub struct KindParams {
    pub kind: Option<String>,
}

impl KindParams {
    fn kind(&self) -> Result<Option<MediaKind>, ApiError> {
        self.kind
            .as_deref()
            .map(|k| k.parse::<MediaKind>().map_err(bad_request))
            .transpose()
    }
}

/// An entry with its estimated wait
#[derive(Debug, Serialize)]
pub struct QueueEntryResponse {
    #[serde(flatten)]
    pub entry: QueueEntry,
    pub position: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_wait_secs: Option<u64>,
}

/// Response for listing the queue
#[derive(Debug, Serialize)]
pub struct QueueResponse {
    pub entries: Vec<QueueEntryResponse>,
    pub status: QueueSnapshot,
}

/// Response for a manual promotion
#[derive(Debug, Serialize)]
pub struct PromoteResponse {
    pub promoted: Option<QueueEntry>,
}

/// Response for the retry eligibility listing
#[derive(Debug, Serialize)]
pub struct EligibleResponse {
    pub media: Vec<MediaResponse>,
    pub total: usize,
}

/// List queue entries in dispatch order
pub async fn list_queue(
    State(state): State<Arc<AppState>>,
    Query(params): Query<KindParams>,
) -> Result<Json<QueueResponse>, ApiError> {
    let kind = params.kind()?;
    let queue = state.gateway().queue();

    let mut positions = [0usize; 2];
    let entries = state
        .gateway()
        .list_queue(kind)
        .into_iter()
        .map(|entry| {
            let slot = &mut positions[usize::from(entry.kind == MediaKind::Show)];
            let position = *slot;
            *slot += 1;
            QueueEntryResponse {
                estimated_wait_secs: queue.estimated_wait(entry.media_id).map(|d| d.as_secs()),
                position,
                entry,
            }
        })
        .collect();

    Ok(Json(QueueResponse {
        entries,
        status: queue.status(),
    }))
}

/// Drop every queued entry, optionally for one kind only
pub async fn clear_queue(
    State(state): State<Arc<AppState>>,
    Query(params): Query<KindParams>,
) -> Result<Json<ClearOutcome>, ApiError> {
    let kind = params.kind()?;
    Ok(Json(state.gateway().clear_queue(kind).await))
}

/// Hand the head of a queue to the fetch backend now
pub async fn promote(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> Result<Json<PromoteResponse>, ApiError> {
    let kind: MediaKind = kind.parse().map_err(bad_request)?;
    let promoted = state
        .gateway()
        .promote_next(kind)
        .await
        .map_err(gateway_error)?;
    Ok(Json(PromoteResponse { promoted }))
}

/// Failed records whose backoff has elapsed
pub async fn list_retry_eligible(
    State(state): State<Arc<AppState>>,
) -> Result<Json<EligibleResponse>, ApiError> {
    let records = state
        .gateway()
        .list_failed_eligible_for_retry(Utc::now())
        .map_err(gateway_error)?;
    let media: Vec<MediaResponse> = records
        .into_iter()
        .map(|r| MediaResponse::new(r, &state))
        .collect();
    Ok(Json(EligibleResponse {
        total: media.len(),
        media,
    }))
}
