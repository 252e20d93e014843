//! Media record API handlers.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use seerrbridge_core::gateway::{BulkResult, SkipOutcome};
use seerrbridge_core::ledger::{EpisodeOutcome, SeasonSnapshot};
use seerrbridge_core::media::{DisplayStatus, MediaFilter};
use seerrbridge_core::{MediaKind, MediaRecord, MediaStatus};
use std::sync::Arc;

use super::error::{bad_request, gateway_error, ApiError};
use crate::state::AppState;

/// Maximum allowed limit for media queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for media queries
const DEFAULT_LIMIT: i64 = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for listing media
#[derive(Debug, Deserialize)]
pub struct ListMediaParams {
    pub status: Option<String>,
    pub kind: Option<String>,
    pub subscribed: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Request body for marking media complete
#[derive(Debug, Default, Deserialize)]
pub struct CompleteBody {
    /// Limit completion to one season
    pub season: Option<u32>,
    /// Limit completion to these episodes of `season`
    pub episodes: Option<Vec<u32>>,
}

/// Outcome reported by the fetch backend
#[derive(Debug, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReportBody {
    Success,
    Failure {
        message: String,
    },
    Episodes {
        season: u32,
        episodes: Vec<u32>,
        result: EpisodeOutcome,
    },
    Skipped {
        reason: String,
    },
}

/// Request body for bulk commands
#[derive(Debug, Deserialize)]
pub struct BulkBody {
    pub ids: Vec<i64>,
}

/// A media record with derived fields
#[derive(Debug, Serialize)]
pub struct MediaResponse {
    #[serde(flatten)]
    pub record: MediaRecord,
    pub display_status: DisplayStatus,
    pub progress: u8,
    pub season_details: Vec<SeasonSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_wait_secs: Option<u64>,
}

impl MediaResponse {
    pub(crate) fn new(record: MediaRecord, state: &AppState) -> Self {
        let estimated_wait_secs = state
            .gateway()
            .queue()
            .estimated_wait(record.id)
            .map(|d| d.as_secs());
        Self {
            display_status: record.display_status(),
            progress: record.progress(),
            season_details: record.season_snapshots(),
            estimated_wait_secs,
            record,
        }
    }
}

/// Response for listing media
#[derive(Debug, Serialize)]
pub struct ListMediaResponse {
    pub media: Vec<MediaResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

fn respond(state: &AppState, record: MediaRecord) -> Json<MediaResponse> {
    Json(MediaResponse::new(record, state))
}

// ============================================================================
// Handlers
// ============================================================================

/// List media with optional filters
pub async fn list_media(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListMediaParams>,
) -> Result<Json<ListMediaResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = MediaFilter::new();
    if let Some(ref status) = params.status {
        let status: MediaStatus = status.parse().map_err(bad_request)?;
        filter = filter.with_status(status);
    }
    if let Some(ref kind) = params.kind {
        let kind: MediaKind = kind.parse().map_err(bad_request)?;
        filter = filter.with_kind(kind);
    }
    if let Some(subscribed) = params.subscribed {
        filter = filter.with_subscribed(subscribed);
    }

    let total = state.gateway().count_media(&filter).map_err(gateway_error)?;
    let records = state
        .gateway()
        .list_media(&filter.with_limit(limit).with_offset(offset))
        .map_err(gateway_error)?;

    Ok(Json(ListMediaResponse {
        media: records
            .into_iter()
            .map(|r| MediaResponse::new(r, &state))
            .collect(),
        total,
        limit,
        offset,
    }))
}

/// Get a media record by ID
pub async fn get_media(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<MediaResponse>, ApiError> {
    let record = state.gateway().get_media_record(id).map_err(gateway_error)?;
    Ok(respond(&state, record))
}

/// Delete a media record
pub async fn delete_media(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<MediaRecord>, ApiError> {
    state
        .gateway()
        .delete(id)
        .await
        .map(Json)
        .map_err(gateway_error)
}

/// Mark a record, a season or specific episodes complete
pub async fn complete_media(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<CompleteBody>,
) -> Result<Json<MediaResponse>, ApiError> {
    let record = state
        .gateway()
        .mark_complete(id, body.season, body.episodes)
        .await
        .map_err(gateway_error)?;
    Ok(respond(&state, record))
}

pub async fn retrigger_media(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<MediaResponse>, ApiError> {
    let record = state.gateway().retrigger(id).await.map_err(gateway_error)?;
    Ok(respond(&state, record))
}

pub async fn skip_media(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<SkipOutcome>, ApiError> {
    state
        .gateway()
        .skip(id)
        .await
        .map(Json)
        .map_err(gateway_error)
}

pub async fn toggle_ignore(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<MediaResponse>, ApiError> {
    let record = state
        .gateway()
        .toggle_ignore(id)
        .await
        .map_err(gateway_error)?;
    Ok(respond(&state, record))
}

pub async fn toggle_subscription(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<MediaResponse>, ApiError> {
    let record = state
        .gateway()
        .toggle_subscription(id)
        .await
        .map_err(gateway_error)?;
    Ok(respond(&state, record))
}

/// Requeue a failed record without waiting for its backoff
pub async fn retry_media(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<MediaResponse>, ApiError> {
    let record = state.gateway().retry_now(id).await.map_err(gateway_error)?;
    Ok(respond(&state, record))
}

pub async fn acknowledge_discrepancy(
    State(state): State<Arc<AppState>>,
    Path((id, season)): Path<(i64, u32)>,
) -> Result<Json<MediaResponse>, ApiError> {
    let record = state
        .gateway()
        .acknowledge_discrepancy(id, season)
        .await
        .map_err(gateway_error)?;
    Ok(respond(&state, record))
}

/// Outcome report from the fetch backend
pub async fn report_outcome(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<ReportBody>,
) -> Result<Json<MediaResponse>, ApiError> {
    let gateway = state.gateway();
    let result = match body {
        ReportBody::Success => gateway.report_success(id).await,
        ReportBody::Failure { message } => gateway.report_failure(id, &message).await,
        ReportBody::Episodes {
            season,
            episodes,
            result,
        } => gateway.report_episodes(id, season, &episodes, result).await,
        ReportBody::Skipped { reason } => gateway.report_skipped(id, &reason).await,
    };
    let record = result.map_err(gateway_error)?;
    Ok(respond(&state, record))
}

pub async fn bulk_retrigger(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BulkBody>,
) -> Json<BulkResult> {
    Json(state.gateway().retrigger_many(&body.ids).await)
}

pub async fn bulk_ignore(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BulkBody>,
) -> Json<BulkResult> {
    Json(state.gateway().ignore_many(&body.ids).await)
}

pub async fn bulk_delete(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BulkBody>,
) -> Json<BulkResult> {
    Json(state.gateway().delete_many(&body.ids).await)
}
