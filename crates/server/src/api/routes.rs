use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{audit, handlers, media, middleware::metrics_middleware, queue, webhook};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health, config and stats
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/stats", get(handlers::get_stats))
        // Inbound events
        .route("/webhook", post(webhook::receive_webhook))
        .route("/requests", post(webhook::submit_request))
        .route("/metadata/refresh", post(webhook::refresh_metadata))
        // Media records
        .route("/media", get(media::list_media))
        .route("/media/bulk/retrigger", post(media::bulk_retrigger))
        .route("/media/bulk/ignore", post(media::bulk_ignore))
        .route("/media/bulk/delete", post(media::bulk_delete))
        .route("/media/{id}", get(media::get_media))
        .route("/media/{id}", delete(media::delete_media))
        .route("/media/{id}/complete", post(media::complete_media))
        .route("/media/{id}/retrigger", post(media::retrigger_media))
        .route("/media/{id}/skip", post(media::skip_media))
        .route("/media/{id}/ignore", post(media::toggle_ignore))
        .route("/media/{id}/subscription", post(media::toggle_subscription))
        .route("/media/{id}/retry", post(media::retry_media))
        .route(
            "/media/{id}/seasons/{season}/acknowledge",
            post(media::acknowledge_discrepancy),
        )
        .route("/media/{id}/report", post(media::report_outcome))
        // Dispatch queue and retries
        .route("/queue", get(queue::list_queue))
        .route("/queue", delete(queue::clear_queue))
        .route("/queue/{kind}/promote", post(queue::promote))
        .route("/retry/eligible", get(queue::list_retry_eligible))
        // Audit
        .route("/audit", get(audit::query_audit))
        .with_state(Arc::clone(&state));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
