//! In-process harness for the HTTP API.
//!
//! The router runs over the core `TestGateway` mocks plus a real in-memory
//! audit store; requests go through `tower::ServiceExt::oneshot`. The
//! scheduler is built but never started, so promotion only happens when a
//! test asks for it.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use seerrbridge_core::audit::{create_audit_system, AuditFilter, AuditStore, SqliteAuditStore};
use seerrbridge_core::testing::fixtures::TestGateway;
use seerrbridge_core::{Config, Scheduler, SchedulerConfig};
use seerrbridge_server::api::create_router;
use seerrbridge_server::state::AppState;

pub use seerrbridge_core::testing::fixtures;

pub struct TestFixture {
    pub router: Router,
    pub harness: TestGateway,
    pub audit_store: Arc<dyn AuditStore>,
}

#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    /// Parsed JSON, or `Null` for empty and non-JSON bodies
    pub body: Value,
}

enum Payload {
    None,
    Json(Value),
    Raw(String),
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::with_capacity(250, 250).await
    }

    pub async fn with_capacity(movie_capacity: usize, show_capacity: usize) -> Self {
        let harness = TestGateway::with_capacity(movie_capacity, show_capacity);

        let audit_store: Arc<dyn AuditStore> = Arc::new(SqliteAuditStore::in_memory().unwrap());
        let (audit, writer) = create_audit_system(Arc::clone(&audit_store), 64);
        tokio::spawn(writer.run());

        let gateway = harness.gateway.clone().with_audit(audit);
        let scheduler = Arc::new(Scheduler::new(SchedulerConfig::default(), gateway.clone()));
        let state = AppState::new(
            Config::default(),
            gateway,
            scheduler,
            Arc::clone(&audit_store),
        );

        Self {
            router: create_router(Arc::new(state)),
            harness,
            audit_store,
        }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.call(Method::GET, path, Payload::None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.call(Method::POST, path, Payload::Json(body)).await
    }

    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.call(Method::POST, path, Payload::None).await
    }

    /// POST a body verbatim, for malformed JSON cases.
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        self.call(Method::POST, path, Payload::Raw(body.to_string()))
            .await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        self.call(Method::DELETE, path, Payload::None).await
    }

    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let (status, bytes) = self.raw(Method::GET, path, Payload::None).await;
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Block until the audit writer has drained: two consecutive reads of the
    /// row count agree.
    pub async fn settle_audit(&self) {
        let mut last = -1;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let count = self.audit_store.count(&AuditFilter::new()).unwrap();
            if count == last {
                return;
            }
            last = count;
        }
    }

    async fn call(&self, method: Method, path: &str, payload: Payload) -> TestResponse {
        let (status, bytes) = self.raw(method, path, payload).await;
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        TestResponse { status, body }
    }

    async fn raw(&self, method: Method, path: &str, payload: Payload) -> (StatusCode, Vec<u8>) {
        let builder = Request::builder().method(method).uri(path);
        let request = match payload {
            Payload::None => builder.body(Body::empty()),
            Payload::Json(value) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(value.to_string())),
            Payload::Raw(text) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(text)),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }
}

#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status,
            $status,
            "unexpected status, body: {}",
            $response.body
        );
    };
}
