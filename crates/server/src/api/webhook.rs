//! Inbound event handlers: request-service webhooks, canonical requests and
//! provider metadata refreshes.

use axum::{extract::State, http::StatusCode, Json};
use seerrbridge_core::events::{InboundRequest, ProviderRefresh, WebhookPayload};
use seerrbridge_core::gateway::{RefreshOutcome, RequestOutcome, WebhookOutcome};
use std::sync::Arc;
use tracing::debug;

use super::error::{gateway_error, ApiError};
use crate::state::AppState;

/// Receive a webhook from Overseerr/Jellyseerr
pub async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<WebhookPayload>,
) -> Result<Json<WebhookOutcome>, ApiError> {
    debug!("Webhook received: {}", payload.notification_type);
    state
        .gateway()
        .handle_webhook(&payload)
        .await
        .map(Json)
        .map_err(gateway_error)
}

/// Submit a request in canonical form
pub async fn submit_request(
    State(state): State<Arc<AppState>>,
    Json(request): Json<InboundRequest>,
) -> Result<(StatusCode, Json<RequestOutcome>), ApiError> {
    let outcome = state
        .gateway()
        .handle_request(request)
        .await
        .map_err(gateway_error)?;

    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome)))
}

/// Apply provider season counts to a tracked show
pub async fn refresh_metadata(
    State(state): State<Arc<AppState>>,
    Json(refresh): Json<ProviderRefresh>,
) -> Result<Json<RefreshOutcome>, ApiError> {
    state
        .gateway()
        .refresh_metadata(&refresh)
        .await
        .map(Json)
        .map_err(gateway_error)
}
