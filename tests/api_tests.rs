//! Integration tests for the Wellsync jobs API HTTP surface, exercising the
//! router end to end against an in-memory database.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use migration::{Migrator, MigratorTrait};
use sea_orm::Database;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;
use wellsync::config::AppConfig;
use wellsync::jobs::{HandlerRegistry, JobError, JobHandler, JobKind};
use wellsync::models::job::Model as Job;
use wellsync::server::{AppState, Collaborators, create_app};

struct OkHandler;

#[async_trait]
impl JobHandler for OkHandler {
    async fn execute(&self, _job: &Job) -> Result<(), JobError> {
        Ok(())
    }
}

async fn test_app(collaborators: Collaborators) -> Router {
    let db = Database::connect("sqlite::memory:").await.expect("db");
    Migrator::up(&db, None).await.expect("migrations");
    let state = AppState::new(db, AppConfig::default(), collaborators);
    create_app(state)
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

fn get(path: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .body(Body::empty())
        .expect("request")
}

fn post_json(path: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn post_empty(path: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .body(Body::empty())
        .expect("request")
}

#[tokio::test]
async fn test_root_returns_service_info() {
    let app = test_app(Collaborators::default()).await;

    let response = app.oneshot(get("/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["service"], "wellsync");
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let app = test_app(Collaborators::default()).await;

    let request = Request::builder()
        .uri("/")
        .header("x-request-id", "req-12345")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.headers().get("x-request-id").unwrap(), "req-12345");
}

#[tokio::test]
async fn test_process_rejects_out_of_range_max_jobs() {
    let app = test_app(Collaborators::default()).await;
    let user_id = Uuid::new_v4();

    for bad in ["0", "101"] {
        let response = app
            .clone()
            .oneshot(post_empty(&format!(
                "/users/{}/jobs/process?max_jobs={}",
                user_id, bad
            )))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/problem+json"
        );
        let body = json_body(response).await;
        assert_eq!(body["code"], "VALIDATION_FAILED");
    }
}

#[tokio::test]
async fn test_process_empty_queue() {
    let app = test_app(Collaborators::default()).await;
    let user_id = Uuid::new_v4();

    let response = app
        .oneshot(post_empty(&format!("/users/{}/jobs/process", user_id)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["succeeded"], 0);
    assert_eq!(body["failed"], 0);
    assert_eq!(body["errors"], json!([]));
}

#[tokio::test]
async fn test_status_for_fresh_user() {
    let app = test_app(Collaborators::default()).await;
    let user_id = Uuid::new_v4();

    let response = app
        .oneshot(get(&format!("/users/{}/jobs/status", user_id)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["queue"]["totalJobs"], 0);
    assert_eq!(body["queue"]["pendingJobs"], 0);
    assert_eq!(body["health"]["score"], 100);
    assert_eq!(body["health"]["status"], "excellent");
    assert!(body["estimatedCompletion"].is_null());
    assert!(body["dataFreshness"].is_null());
}

#[tokio::test]
async fn test_status_includes_freshness_on_request() {
    let app = test_app(Collaborators::default()).await;
    let user_id = Uuid::new_v4();

    let response = app
        .oneshot(get(&format!(
            "/users/{}/jobs/status?include_freshness=true",
            user_id
        )))
        .await
        .unwrap();

    let body = json_body(response).await;
    // Empty store: zero raw events reads as fully processed.
    assert_eq!(body["dataFreshness"]["processingRate"], 100);
    assert_eq!(body["dataFreshness"]["needsProcessing"], false);
}

#[tokio::test]
async fn test_sync_unknown_service_rejected() {
    let app = test_app(Collaborators::default()).await;
    let user_id = Uuid::new_v4();

    let response = app
        .oneshot(post_empty(&format!("/users/{}/sync/dropbox", user_id)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["code"], "VALIDATION_FAILED");
}

#[tokio::test]
async fn test_sync_without_normalize_handler_is_partial_failure() {
    // Default collaborators register no job handlers, so the inline drain
    // fails the enqueued normalize job.
    let app = test_app(Collaborators::default()).await;
    let user_id = Uuid::new_v4();

    let response = app
        .oneshot(post_empty(&format!("/users/{}/sync/gmail", user_id)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["partialFailure"], true);
    assert_eq!(body["stats"]["jobsFailed"], 1);
    assert!(body["sessionId"].is_string());
}

#[tokio::test]
async fn test_sync_with_handler_completes_cleanly() {
    let mut registry = HandlerRegistry::new();
    registry.register(JobKind::Normalize, Arc::new(OkHandler));
    let app = test_app(Collaborators {
        registry,
        ..Default::default()
    })
    .await;
    let user_id = Uuid::new_v4();

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/users/{}/sync/calendar", user_id),
            json!({"days_past": 7}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["partialFailure"], false);
    assert_eq!(body["stats"]["jobsSucceeded"], 1);

    // The drained job shows up as completed in the status report.
    let status = app
        .oneshot(get(&format!("/users/{}/jobs/status", user_id)))
        .await
        .unwrap();
    let status_body = json_body(status).await;
    assert_eq!(status_body["queue"]["statusCounts"]["completed"], 1);
    assert!(status_body["estimatedCompletion"].is_null());
}

#[tokio::test]
async fn test_acknowledge_unknown_error() {
    let app = test_app(Collaborators::default()).await;

    let response = app
        .oneshot(post_empty(&format!(
            "/users/{}/errors/{}/acknowledge",
            Uuid::new_v4(),
            Uuid::new_v4()
        )))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["updated"], false);
}

#[tokio::test]
async fn test_error_summary_after_failed_drain() {
    let app = test_app(Collaborators::default()).await;
    let user_id = Uuid::new_v4();

    // Produce one failed normalize job and its tracked error.
    app.clone()
        .oneshot(post_empty(&format!("/users/{}/sync/gmail", user_id)))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(get(&format!("/users/{}/errors/summary", user_id)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["recent"].as_array().unwrap().len(), 1);

    let response = app
        .oneshot(get(&format!(
            "/users/{}/errors/summary?provider=invalid",
            user_id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cleanup_endpoint() {
    let app = test_app(Collaborators::default()).await;

    let response = app
        .clone()
        .oneshot(post_empty("/admin/errors/cleanup"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["deleted"], 0);

    let response = app
        .oneshot(post_empty("/admin/errors/cleanup?retention_days=0"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
