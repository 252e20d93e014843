//! Mapping from domain errors to HTTP responses.

use axum::{http::StatusCode, Json};
use serde::Serialize;
use seerrbridge_core::GatewayError;

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error half of every handler result.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

pub fn bad_request(message: impl Into<String>) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, message)
}

pub fn status_for(error: &GatewayError) -> StatusCode {
    match error {
        GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
        GatewayError::QueueFull { .. } => StatusCode::SERVICE_UNAVAILABLE,
        GatewayError::AlreadyQueued(_) | GatewayError::InvalidTransition(_) => {
            StatusCode::CONFLICT
        }
        GatewayError::OutOfRangeEpisode { .. }
        | GatewayError::InvalidRequest(_)
        | GatewayError::UnknownTitle { .. } => StatusCode::BAD_REQUEST,
        GatewayError::ExternalBackendUnreachable(_) => StatusCode::BAD_GATEWAY,
        GatewayError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<GatewayError> for ErrorResponse {
    fn from(e: GatewayError) -> Self {
        Self {
            error: e.to_string(),
        }
    }
}

pub fn gateway_error(error: GatewayError) -> ApiError {
    (status_for(&error), Json(ErrorResponse::from(error)))
}
