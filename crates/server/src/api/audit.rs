//! Audit trail query handler.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use seerrbridge_core::audit::{AuditError, AuditFilter, AuditRecord, DEFAULT_AUDIT_LIMIT};
use seerrbridge_core::MediaKind;
use std::sync::Arc;

use super::error::{api_error, bad_request, ApiError};
use crate::state::AppState;

const MAX_LIMIT: i64 = 1000;

#[derive(Debug, Deserialize)]
pub struct AuditQueryParams {
    pub media_id: Option<i64>,
    /// One event type, or several separated by commas
    pub event_type: Option<String>,
    pub kind: Option<String>,
    pub user_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl AuditQueryParams {
    fn filter(&self) -> Result<AuditFilter, ApiError> {
        let mut filter = match self.media_id {
            Some(id) => AuditFilter::for_media(id),
            None => AuditFilter::new(),
        };
        for event_type in self
            .event_type
            .iter()
            .flat_map(|types| types.split(','))
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            filter = filter.with_event_type(event_type);
        }
        if let Some(kind) = self.kind.as_deref() {
            filter = filter.with_kind(kind.parse::<MediaKind>().map_err(bad_request)?);
        }
        if let Some(user_id) = self.user_id.as_deref() {
            filter = filter.with_user_id(user_id);
        }
        if let Some(from) = self.from {
            filter = filter.since(from);
        }
        if let Some(to) = self.to {
            filter = filter.until(to);
        }

        let limit = self.limit.unwrap_or(DEFAULT_AUDIT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = self.offset.unwrap_or(0).max(0);
        Ok(filter.page(limit, offset))
    }
}

#[derive(Debug, Serialize)]
pub struct AuditQueryResponse {
    pub events: Vec<AuditRecord>,
    /// Matching events ignoring pagination
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

fn store_error(e: AuditError) -> ApiError {
    api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

/// Query audit events, newest first
pub async fn query_audit(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuditQueryParams>,
) -> Result<Json<AuditQueryResponse>, ApiError> {
    let filter = params.filter()?;
    let store = state.audit_store();

    let events = store.query(&filter).map_err(store_error)?;
    let total = store.count(&filter).map_err(store_error)?;

    Ok(Json(AuditQueryResponse {
        events,
        total,
        limit: filter.limit,
        offset: filter.offset,
    }))
}
