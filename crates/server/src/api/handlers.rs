use axum::{extract::State, http::header, response::IntoResponse, Json};
use serde::Serialize;
use seerrbridge_core::gateway::GatewayStats;
use seerrbridge_core::{SanitizedConfig, SchedulerStatus};
use std::sync::Arc;

use super::error::{gateway_error, ApiError};
use crate::metrics::{collect_dynamic_metrics, encode_metrics};
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

/// Response for the stats endpoint
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub media: GatewayStats,
    pub scheduler: SchedulerStatus,
}

pub async fn get_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatsResponse>, ApiError> {
    let media = state.gateway().stats().map_err(gateway_error)?;
    let scheduler = state.scheduler().status().await;
    Ok(Json(StatsResponse { media, scheduler }))
}

/// Prometheus text exposition
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    collect_dynamic_metrics(&state).await;
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}
