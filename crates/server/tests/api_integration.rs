//! API integration tests over the in-process router.

mod common;

use axum::http::StatusCode;
use serde_json::{json, Value};

use common::TestFixture;

fn movie_webhook(notification_type: &str, tmdb_id: Value) -> Value {
    json!({
        "notification_type": notification_type,
        "subject": "The Matrix (1999)",
        "media": {
            "media_type": "movie",
            "tmdbId": tmdb_id,
            "imdbId": "tt0133093"
        },
        "request": {
            "request_id": "17",
            "requestedBy_username": "neo"
        }
    })
}

async fn create_movie(fixture: &TestFixture, provider_id: u64) -> i64 {
    let response = fixture
        .post(
            "/api/v1/requests",
            json!({ "provider_id": provider_id, "kind": "movie", "title": format!("Movie {}", provider_id) }),
        )
        .await;
    assert_status!(response, StatusCode::CREATED);
    response.body["media_id"].as_i64().unwrap()
}

async fn create_show(fixture: &TestFixture, provider_id: u64, seasons: Vec<u32>) -> i64 {
    let response = fixture
        .post(
            "/api/v1/requests",
            json!({ "provider_id": provider_id, "kind": "show", "seasons": seasons }),
        )
        .await;
    assert_status!(response, StatusCode::CREATED);
    response.body["media_id"].as_i64().unwrap()
}

// =============================================================================
// Health, config, stats
// =============================================================================

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/health").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}

#[tokio::test]
async fn test_config_is_served() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/config").await;
    assert_status!(response, StatusCode::OK);
    assert!(response.body.is_object());
    assert!(response.body["queue"].is_object());
}

#[tokio::test]
async fn test_stats_count_records() {
    let fixture = TestFixture::new().await;
    create_movie(&fixture, 603).await;
    create_show(&fixture, 1399, vec![1]).await;

    let response = fixture.get("/api/v1/stats").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["total"], 2);
    assert_eq!(response.body["by_status"]["pending"], 2);
    assert_eq!(response.body["scheduler"]["running"], false);
}

// =============================================================================
// Webhook and requests
// =============================================================================

#[tokio::test]
async fn test_webhook_test_notification() {
    let fixture = TestFixture::new().await;
    let response = fixture
        .post(
            "/api/v1/webhook",
            json!({ "notification_type": "TEST_NOTIFICATION", "subject": "Test" }),
        )
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["outcome"], "test");
}

#[tokio::test]
async fn test_webhook_creates_and_queues_movie() {
    let fixture = TestFixture::new().await;
    let response = fixture
        .post("/api/v1/webhook", movie_webhook("MEDIA_AUTO_APPROVED", json!(603)))
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["outcome"], "request");
    assert_eq!(response.body["created"], true);
    assert_eq!(response.body["queued"], true);

    let media_id = response.body["media_id"].as_i64().unwrap();
    let media = fixture.get(&format!("/api/v1/media/{}", media_id)).await;
    assert_status!(media, StatusCode::OK);
    assert_eq!(media.body["title"], "The Matrix");
    assert_eq!(media.body["year"], 1999);
    assert_eq!(media.body["status"], "pending");
    assert_eq!(media.body["display_status"], "pending");
    assert_eq!(media.body["requested_by"], "neo");
    assert_eq!(media.body["external_ids"]["imdb"], "tt0133093");
}

#[tokio::test]
async fn test_webhook_accepts_string_ids() {
    let fixture = TestFixture::new().await;
    let first = fixture
        .post("/api/v1/webhook", movie_webhook("MEDIA_PENDING", json!("603")))
        .await;
    assert_status!(first, StatusCode::OK);

    let second = fixture
        .post("/api/v1/webhook", movie_webhook("MEDIA_APPROVED", json!(603)))
        .await;
    assert_status!(second, StatusCode::OK);
    assert_eq!(second.body["created"], false);
    assert_eq!(second.body["request_count"], 2);
    assert_eq!(second.body["media_id"], first.body["media_id"]);
}

#[tokio::test]
async fn test_webhook_show_with_named_seasons() {
    let fixture = TestFixture::new().await;
    let response = fixture
        .post(
            "/api/v1/webhook",
            json!({
                "notification_type": "MEDIA_AUTO_APPROVED",
                "subject": "Game of Thrones",
                "media": { "media_type": "tv", "tmdbId": 1399, "tvdbId": "121361" },
                "extra": [{ "name": "Requested Seasons", "value": "1, 2" }]
            }),
        )
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["affected_seasons"], json!([1, 2]));

    let media_id = response.body["media_id"].as_i64().unwrap();
    let media = fixture.get(&format!("/api/v1/media/{}", media_id)).await;
    assert_eq!(media.body["kind"], "show");
    assert_eq!(media.body["requested_seasons"], json!([1, 2]));
    assert_eq!(media.body["external_ids"]["tvdb"], 121361);
}

#[tokio::test]
async fn test_webhook_declined_cancels_record() {
    let fixture = TestFixture::new().await;
    let created = fixture
        .post("/api/v1/webhook", movie_webhook("MEDIA_PENDING", json!(603)))
        .await;
    let media_id = created.body["media_id"].as_i64().unwrap();

    let response = fixture
        .post("/api/v1/webhook", movie_webhook("MEDIA_DECLINED", json!(603)))
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["outcome"], "declined");
    assert_eq!(response.body["media_id"], media_id);

    let media = fixture.get(&format!("/api/v1/media/{}", media_id)).await;
    assert_eq!(media.body["status"], "cancelled");

    let queue = fixture.get("/api/v1/queue").await;
    assert_eq!(queue.body["entries"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_webhook_unsupported_type_is_ignored() {
    let fixture = TestFixture::new().await;
    let response = fixture
        .post("/api/v1/webhook", movie_webhook("MEDIA_AVAILABLE", json!(603)))
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["outcome"], "ignored");
    assert_eq!(response.body["notification_type"], "MEDIA_AVAILABLE");
}

#[tokio::test]
async fn test_webhook_without_media_is_rejected() {
    let fixture = TestFixture::new().await;
    let response = fixture
        .post("/api/v1/webhook", json!({ "notification_type": "MEDIA_PENDING" }))
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].is_string());
}

#[tokio::test]
async fn test_webhook_malformed_json() {
    let fixture = TestFixture::new().await;
    let response = fixture.post_raw("/api/v1/webhook", "{not json").await;
    assert!(response.status.is_client_error());
}

#[tokio::test]
async fn test_request_repeat_returns_ok() {
    let fixture = TestFixture::new().await;
    let media_id = create_movie(&fixture, 603).await;

    let response = fixture
        .post("/api/v1/requests", json!({ "provider_id": 603, "kind": "movie" }))
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["media_id"], media_id);
    assert_eq!(response.body["created"], false);
    assert_eq!(response.body["request_count"], 2);
    assert_eq!(response.body["queued"], true);
}

#[tokio::test]
async fn test_request_with_zero_provider_id() {
    let fixture = TestFixture::new().await;
    let response = fixture
        .post("/api/v1/requests", json!({ "provider_id": 0, "kind": "movie" }))
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_request_queue_full_keeps_record_pending() {
    let fixture = TestFixture::with_capacity(1, 1).await;
    create_movie(&fixture, 1).await;

    let response = fixture
        .post("/api/v1/requests", json!({ "provider_id": 2, "kind": "movie" }))
        .await;
    assert_status!(response, StatusCode::CREATED);
    assert_eq!(response.body["queued"], false);
    assert!(response.body["queue_rejection"]
        .as_str()
        .unwrap()
        .contains("queue is full"));

    let media_id = response.body["media_id"].as_i64().unwrap();
    let media = fixture.get(&format!("/api/v1/media/{}", media_id)).await;
    assert_eq!(media.body["status"], "pending");
}

#[tokio::test]
async fn test_metadata_refresh_unknown_title() {
    let fixture = TestFixture::new().await;
    let response = fixture
        .post(
            "/api/v1/metadata/refresh",
            json!({
                "provider_id": 4242,
                "kind": "show",
                "seasons": [{ "season_number": 1, "episode_count": 10, "aired_episodes": 10 }]
            }),
        )
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_metadata_refresh_fills_season_details() {
    let fixture = TestFixture::new().await;
    let media_id = create_show(&fixture, 1399, vec![1]).await;

    let response = fixture
        .post(
            "/api/v1/metadata/refresh",
            json!({
                "provider_id": 1399,
                "kind": "show",
                "seasons": [{ "season_number": 1, "episode_count": 10, "aired_episodes": 4 }]
            }),
        )
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["media_id"], media_id);

    let media = fixture.get(&format!("/api/v1/media/{}", media_id)).await;
    let details = media.body["season_details"].as_array().unwrap();
    assert!(!details.is_empty());
}

#[tokio::test]
async fn test_metadata_refresh_rejects_huge_counts() {
    let fixture = TestFixture::new().await;
    create_show(&fixture, 1399, vec![1]).await;

    let response = fixture
        .post(
            "/api/v1/metadata/refresh",
            json!({
                "provider_id": 1399,
                "kind": "show",
                "seasons": [{ "season_number": 1, "episode_count": 4294967295u32, "aired_episodes": 1 }]
            }),
        )
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("episode_count"));
}

// =============================================================================
// Media
// =============================================================================

#[tokio::test]
async fn test_get_media_not_found() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/media/999").await;
    assert_status!(response, StatusCode::NOT_FOUND);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("not found"));
}

#[tokio::test]
async fn test_list_media_with_filters() {
    let fixture = TestFixture::new().await;
    create_movie(&fixture, 1).await;
    create_movie(&fixture, 2).await;
    create_show(&fixture, 3, vec![]).await;

    let all = fixture.get("/api/v1/media").await;
    assert_status!(all, StatusCode::OK);
    assert_eq!(all.body["total"], 3);
    assert_eq!(all.body["media"].as_array().unwrap().len(), 3);

    let shows = fixture.get("/api/v1/media?kind=show").await;
    assert_eq!(shows.body["total"], 1);

    let page = fixture.get("/api/v1/media?limit=1&offset=1").await;
    assert_eq!(page.body["media"].as_array().unwrap().len(), 1);
    assert_eq!(page.body["limit"], 1);
    assert_eq!(page.body["offset"], 1);
}

#[tokio::test]
async fn test_list_media_rejects_unknown_status() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/media?status=bogus").await;
    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_complete_movie() {
    let fixture = TestFixture::new().await;
    let media_id = create_movie(&fixture, 603).await;

    let response = fixture
        .post(&format!("/api/v1/media/{}/complete", media_id), json!({}))
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["status"], "completed");
    assert_eq!(response.body["progress"], 100);

    let queue = fixture.get("/api/v1/queue").await;
    assert_eq!(queue.body["entries"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_complete_untracked_season() {
    let fixture = TestFixture::new().await;
    let media_id = create_show(&fixture, 1399, vec![1]).await;

    let response = fixture
        .post(
            &format!("/api/v1/media/{}/complete", media_id),
            json!({ "season": 7 }),
        )
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_complete_movie_season_rejected() {
    let fixture = TestFixture::new().await;
    let media_id = create_movie(&fixture, 603).await;

    let response = fixture
        .post(
            &format!("/api/v1/media/{}/complete", media_id),
            json!({ "season": 1 }),
        )
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_retrigger_queued_conflicts() {
    let fixture = TestFixture::new().await;
    let media_id = create_movie(&fixture, 603).await;

    let response = fixture
        .post_empty(&format!("/api/v1/media/{}/retrigger", media_id))
        .await;
    assert_status!(response, StatusCode::CONFLICT);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("already queued"));
}

#[tokio::test]
async fn test_skip_then_retrigger() {
    let fixture = TestFixture::new().await;
    let media_id = create_movie(&fixture, 603).await;

    let skipped = fixture
        .post_empty(&format!("/api/v1/media/{}/skip", media_id))
        .await;
    assert_status!(skipped, StatusCode::OK);
    assert_eq!(skipped.body["removed"], true);
    assert_eq!(skipped.body["was_processing"], false);

    let media = fixture.get(&format!("/api/v1/media/{}", media_id)).await;
    assert_eq!(media.body["status"], "failed");

    let again = fixture
        .post_empty(&format!("/api/v1/media/{}/skip", media_id))
        .await;
    assert_status!(again, StatusCode::OK);
    assert_eq!(again.body["removed"], false);

    let retriggered = fixture
        .post_empty(&format!("/api/v1/media/{}/retrigger", media_id))
        .await;
    assert_status!(retriggered, StatusCode::OK);
    assert_eq!(retriggered.body["status"], "pending");
    assert_eq!(retriggered.body["retry"]["attempt_count"], 0);
}

#[tokio::test]
async fn test_toggle_ignore_round_trip() {
    let fixture = TestFixture::new().await;
    let media_id = create_movie(&fixture, 603).await;
    let path = format!("/api/v1/media/{}/ignore", media_id);

    let ignored = fixture.post_empty(&path).await;
    assert_status!(ignored, StatusCode::OK);
    assert_eq!(ignored.body["status"], "ignored");
    let queue = fixture.get("/api/v1/queue").await;
    assert_eq!(queue.body["entries"].as_array().unwrap().len(), 0);

    let restored = fixture.post_empty(&path).await;
    assert_status!(restored, StatusCode::OK);
    assert_eq!(restored.body["status"], "pending");
    let queue = fixture.get("/api/v1/queue").await;
    assert_eq!(queue.body["entries"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_subscription_toggle() {
    let fixture = TestFixture::new().await;
    let show_id = create_show(&fixture, 1399, vec![]).await;
    let movie_id = create_movie(&fixture, 603).await;

    let response = fixture
        .post_empty(&format!("/api/v1/media/{}/subscription", show_id))
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["subscription_active"], true);

    let subscribed = fixture.get("/api/v1/media?subscribed=true").await;
    assert_eq!(subscribed.body["total"], 1);

    let response = fixture
        .post_empty(&format!("/api/v1/media/{}/subscription", movie_id))
        .await;
    assert_status!(response, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_delete_media() {
    let fixture = TestFixture::new().await;
    let media_id = create_movie(&fixture, 603).await;

    let response = fixture.delete(&format!("/api/v1/media/{}", media_id)).await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["id"], media_id);

    let gone = fixture.get(&format!("/api/v1/media/{}", media_id)).await;
    assert_status!(gone, StatusCode::NOT_FOUND);
    let queue = fixture.get("/api/v1/queue").await;
    assert_eq!(queue.body["entries"].as_array().unwrap().len(), 0);

    let again = fixture.delete(&format!("/api/v1/media/{}", media_id)).await;
    assert_status!(again, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_bulk_operations_report_per_item() {
    let fixture = TestFixture::new().await;
    let a = create_movie(&fixture, 1).await;
    let b = create_movie(&fixture, 2).await;

    let ignored = fixture
        .post("/api/v1/media/bulk/ignore", json!({ "ids": [a, b] }))
        .await;
    assert_status!(ignored, StatusCode::OK);
    assert_eq!(ignored.body["succeeded"], 2);
    assert_eq!(ignored.body["failed"], 0);

    // Ignored records cannot be retriggered.
    let retriggered = fixture
        .post("/api/v1/media/bulk/retrigger", json!({ "ids": [a] }))
        .await;
    assert_eq!(retriggered.body["succeeded"], 0);
    assert_eq!(retriggered.body["failed"], 1);

    let deleted = fixture
        .post("/api/v1/media/bulk/delete", json!({ "ids": [a, b, 999] }))
        .await;
    assert_status!(deleted, StatusCode::OK);
    assert_eq!(deleted.body["succeeded"], 2);
    assert_eq!(deleted.body["failed"], 1);
    assert_eq!(deleted.body["errors"].as_array().unwrap().len(), 1);
}

// =============================================================================
// Queue, reports and retries
// =============================================================================

#[tokio::test]
async fn test_promote_hands_head_to_backend() {
    let fixture = TestFixture::new().await;
    let first = create_movie(&fixture, 1).await;
    let second = create_movie(&fixture, 2).await;

    let response = fixture.post_empty("/api/v1/queue/movie/promote").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["promoted"]["media_id"], first);
    assert_eq!(fixture.harness.backend.fetched_ids().await, vec![first]);

    // One processing slot per kind.
    let busy = fixture.post_empty("/api/v1/queue/movie/promote").await;
    assert_status!(busy, StatusCode::OK);
    assert!(busy.body["promoted"].is_null());

    let queue = fixture.get("/api/v1/queue?kind=movie").await;
    let entries = queue.body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["media_id"], first);
    assert_eq!(entries[0]["queue_status"], "processing");
    assert_eq!(entries[1]["media_id"], second);
    assert_eq!(entries[1]["position"], 1);

    let media = fixture.get(&format!("/api/v1/media/{}", first)).await;
    assert_eq!(media.body["status"], "processing");
}

#[tokio::test]
async fn test_promote_unknown_kind() {
    let fixture = TestFixture::new().await;
    let response = fixture.post_empty("/api/v1/queue/music/promote").await;
    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_promote_with_unreachable_backend() {
    let fixture = TestFixture::new().await;
    let media_id = create_movie(&fixture, 1).await;
    fixture.harness.backend.set_unreachable(true).await;

    let response = fixture.post_empty("/api/v1/queue/movie/promote").await;
    assert_status!(response, StatusCode::BAD_GATEWAY);

    let queue = fixture.get("/api/v1/queue?kind=movie").await;
    let entries = queue.body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["media_id"], media_id);
    assert_eq!(entries[0]["queue_status"], "queued");
}

#[tokio::test]
async fn test_clear_queue() {
    let fixture = TestFixture::new().await;
    create_movie(&fixture, 1).await;
    create_movie(&fixture, 2).await;
    create_show(&fixture, 3, vec![]).await;

    let response = fixture.delete("/api/v1/queue?kind=movie").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["cleared"], 2);

    let queue = fixture.get("/api/v1/queue").await;
    let entries = queue.body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["kind"], "show");
}

#[tokio::test]
async fn test_report_success_completes() {
    let fixture = TestFixture::new().await;
    let media_id = create_movie(&fixture, 603).await;
    fixture.post_empty("/api/v1/queue/movie/promote").await;

    let response = fixture
        .post(
            &format!("/api/v1/media/{}/report", media_id),
            json!({ "outcome": "success" }),
        )
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["status"], "completed");

    let queue = fixture.get("/api/v1/queue").await;
    assert_eq!(queue.body["entries"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_report_failure_then_manual_retry() {
    let fixture = TestFixture::new().await;
    let media_id = create_movie(&fixture, 603).await;
    fixture.post_empty("/api/v1/queue/movie/promote").await;

    let failed = fixture
        .post(
            &format!("/api/v1/media/{}/report", media_id),
            json!({ "outcome": "failure", "message": "no sources" }),
        )
        .await;
    assert_status!(failed, StatusCode::OK);
    assert_eq!(failed.body["status"], "failed");
    assert_eq!(failed.body["error_message"], "no sources");
    assert_eq!(failed.body["retry"]["attempt_count"], 1);

    // The first backoff has not elapsed yet.
    let eligible = fixture.get("/api/v1/retry/eligible").await;
    assert_status!(eligible, StatusCode::OK);
    assert_eq!(eligible.body["total"], 0);

    let retried = fixture
        .post_empty(&format!("/api/v1/media/{}/retry", media_id))
        .await;
    assert_status!(retried, StatusCode::OK);
    assert_eq!(retried.body["status"], "pending");
    assert_eq!(retried.body["retry"]["attempt_count"], 2);

    let again = fixture
        .post_empty(&format!("/api/v1/media/{}/retry", media_id))
        .await;
    assert_status!(again, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_report_unknown_outcome() {
    let fixture = TestFixture::new().await;
    let media_id = create_movie(&fixture, 603).await;
    let response = fixture
        .post(
            &format!("/api/v1/media/{}/report", media_id),
            json!({ "outcome": "exploded" }),
        )
        .await;
    assert!(response.status.is_client_error());
}

#[tokio::test]
async fn test_acknowledge_untracked_season() {
    let fixture = TestFixture::new().await;
    let media_id = create_show(&fixture, 1399, vec![1]).await;
    let response = fixture
        .post_empty(&format!("/api/v1/media/{}/seasons/4/acknowledge", media_id))
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Audit and metrics
// =============================================================================

#[tokio::test]
async fn test_audit_records_request_lifecycle() {
    let fixture = TestFixture::new().await;
    let media_id = create_movie(&fixture, 603).await;
    fixture.post_empty("/api/v1/queue/movie/promote").await;
    fixture.settle_audit().await;

    let response = fixture
        .get(&format!("/api/v1/audit?media_id={}", media_id))
        .await;
    assert_status!(response, StatusCode::OK);

    let types: Vec<&str> = response.body["events"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["event_type"].as_str())
        .collect();
    assert!(types.contains(&"request_received"));
    assert!(types.contains(&"enqueued"));
    assert!(types.contains(&"promoted"));
    assert_eq!(response.body["total"].as_u64().unwrap() as usize, types.len());
}

#[tokio::test]
async fn test_audit_filter_and_pagination() {
    let fixture = TestFixture::new().await;
    create_movie(&fixture, 1).await;
    create_movie(&fixture, 2).await;
    fixture.settle_audit().await;

    let response = fixture
        .get("/api/v1/audit?event_type=request_received&limit=1")
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["total"], 2);
    assert_eq!(response.body["limit"], 1);
    assert_eq!(response.body["events"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_audit_filter_by_kind_and_type_list() {
    let fixture = TestFixture::new().await;
    create_movie(&fixture, 1).await;
    create_show(&fixture, 1399, vec![1]).await;
    fixture.settle_audit().await;

    let response = fixture
        .get("/api/v1/audit?kind=show&event_type=request_received,enqueued")
        .await;
    assert_status!(response, StatusCode::OK);
    let events = response.body["events"].as_array().unwrap();
    assert_eq!(response.body["total"], 2);
    assert!(events.iter().all(|e| e["kind"] == "show"));

    let response = fixture.get("/api/v1/audit?kind=album").await;
    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new().await;
    create_movie(&fixture, 603).await;

    let (status, body) = fixture.get_text("/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("seerrbridge_http_requests_total"));
    assert!(body.contains("seerrbridge_media_by_status"));
}
