//! Router tests against the in-memory backends.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use reel_api::{create_router, ApiConfig, AppState};
use reel_jobstore::{JobStore, MemoryJobStore};
use reel_models::{JobId, JobStatus};
use reel_queue::MemoryDispatcher;
use reel_storage::{MemoryStore, ObjectStore};

struct TestApp {
    router: Router,
    jobs: Arc<MemoryJobStore>,
    storage: Arc<MemoryStore>,
    dispatcher: Arc<MemoryDispatcher>,
}

fn test_app_with(config: ApiConfig, dispatcher: MemoryDispatcher) -> TestApp {
    let jobs = Arc::new(MemoryJobStore::new());
    let storage = Arc::new(MemoryStore::new());
    let dispatcher = Arc::new(dispatcher);

    let state = AppState::new(config, jobs.clone(), storage.clone(), dispatcher.clone());

    TestApp {
        router: create_router(state, None),
        jobs,
        storage,
        dispatcher,
    }
}

fn test_app() -> TestApp {
    test_app_with(ApiConfig::default(), MemoryDispatcher::new())
}

const VOICE: &str = "21m00Tcm4TlvDq8ikWAM";

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

async fn create(app: &TestApp, script: &str) -> (StatusCode, Value) {
    send(
        app,
        json_request(
            "POST",
            "/api/jobs",
            json!({"script": script, "voice": VOICE, "segment_count": 3}),
        ),
    )
    .await
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app();
    let (status, body) = send(&app, empty_request("GET", "/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_ready_reports_backends() {
    let app = test_app();
    let (status, body) = send(&app, empty_request("GET", "/ready")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dispatcher"], "memory");
    assert_eq!(body["checks"]["job_store"]["status"], "ok");
}

#[tokio::test]
async fn test_index_serves_ui() {
    let app = test_app();
    let response = app
        .router
        .clone()
        .oneshot(empty_request("GET", "/"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("setInterval(refresh, POLL_MS)"));
}

#[tokio::test]
async fn test_create_job_stores_and_dispatches() {
    let app = test_app();
    let (status, body) = create(&app, "A story about rivers.").await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["segment_count"], 3);

    let id = JobId::from_string(body["id"].as_str().unwrap());
    let stored = app.jobs.require(&id).await.unwrap();
    assert!(stored.logs.iter().any(|l| l.message.contains("memory-1")));

    let dispatched = app.dispatcher.dispatched().await;
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].job_id, id);
    assert_eq!(dispatched[0].attempt, 1);
}

#[tokio::test]
async fn test_create_job_rejects_invalid_input() {
    let app = test_app();

    let (status, _) = send(
        &app,
        json_request("POST", "/api/jobs", json!({"script": "", "voice": VOICE})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/jobs",
            json!({"script": "hello", "voice": "not-a-voice"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].as_str().unwrap().contains("unknown voice"));

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/api/jobs",
            json!({"script": "hello", "voice": VOICE, "segment_count": 0}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    assert!(app.jobs.list(10, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_dispatch_failure_marks_job_failed() {
    let app = test_app_with(ApiConfig::default(), MemoryDispatcher::failing("queue down"));
    let (status, body) = create(&app, "Doomed from the start.").await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["detail"].as_str().unwrap().contains("queue down"));

    let jobs = app.jobs.list(10, 0).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Error);
    assert!(jobs[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("queue down"));
}

#[tokio::test]
async fn test_list_and_get_jobs() {
    let app = test_app();
    create(&app, "first").await;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let (_, second) = create(&app, "second").await;

    let (status, body) = send(&app, empty_request("GET", "/api/jobs?limit=500")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["limit"], 100);
    assert_eq!(body["jobs"].as_array().unwrap().len(), 2);
    assert_eq!(body["jobs"][0]["id"], second["id"]);

    let (_, page) = send(&app, empty_request("GET", "/api/jobs?limit=1&offset=1")).await;
    assert_eq!(page["jobs"].as_array().unwrap().len(), 1);
    assert_eq!(page["jobs"][0]["script_preview"], "first");

    let uri = format!("/api/jobs/{}", second["id"].as_str().unwrap());
    let (status, job) = send(&app, empty_request("GET", &uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["script"], "second");
    assert!(job["logs"].as_array().unwrap().len() >= 2);
}

#[tokio::test]
async fn test_get_job_errors() {
    let app = test_app();

    let (status, _) = send(&app, empty_request("GET", "/api/jobs/not-a-uuid")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let uri = format!("/api/jobs/{}", JobId::new());
    let (status, body) = send(&app, empty_request("GET", &uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn test_delete_rejects_running_job() {
    let app = test_app();
    let (_, body) = create(&app, "busy").await;
    let id = JobId::from_string(body["id"].as_str().unwrap());

    app.jobs
        .transition(&id, JobStatus::GeneratingJsons)
        .await
        .unwrap();

    let uri = format!("/api/jobs/{}", id);
    let (status, _) = send(&app, empty_request("DELETE", &uri)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(app.jobs.get(&id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_delete_removes_row_and_folder() {
    let app = test_app();
    let (_, body) = create(&app, "short lived").await;
    let id = JobId::from_string(body["id"].as_str().unwrap());
    let folder = body["output_folder"].as_str().unwrap().to_string();

    app.storage
        .upload_bytes(b"{}".to_vec(), &format!("{}/segments.json", folder), "application/json")
        .await
        .unwrap();
    app.storage
        .upload_bytes(b"keep".to_vec(), "jobs/other/segments.json", "application/json")
        .await
        .unwrap();
    app.jobs.fail(&id, "gave up").await.unwrap();

    let uri = format!("/api/jobs/{}", id);
    let (status, _) = send(&app, empty_request("DELETE", &uri)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert!(app.jobs.get(&id).await.unwrap().is_none());
    assert_eq!(app.storage.len().await, 1);
}

#[tokio::test]
async fn test_retry_only_failed_jobs() {
    let app = test_app();
    let (_, body) = create(&app, "try again").await;
    let id = JobId::from_string(body["id"].as_str().unwrap());
    let uri = format!("/api/jobs/{}/retry", id);

    let (status, _) = send(&app, empty_request("POST", &uri)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    app.jobs.fail(&id, "tts exploded").await.unwrap();

    let (status, job) = send(&app, empty_request("POST", &uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["status"], "pending");
    assert_eq!(job["progress"], 0);
    assert!(job.get("error_message").map_or(true, Value::is_null));

    let dispatched = app.dispatcher.dispatched().await;
    assert_eq!(dispatched.len(), 2);
    assert_eq!(dispatched[1].attempt, 2);
    assert_ne!(
        dispatched[0].idempotency_key(),
        dispatched[1].idempotency_key()
    );
}

#[tokio::test]
async fn test_video_link_requires_finished_job() {
    let app = test_app();
    let (_, body) = create(&app, "to the end").await;
    let id = JobId::from_string(body["id"].as_str().unwrap());
    let uri = format!("/api/jobs/{}/video", id);

    let (status, _) = send(&app, empty_request("GET", &uri)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let key = format!("{}/final.mp4", body["output_folder"].as_str().unwrap());
    app.storage
        .upload_bytes(b"mp4".to_vec(), &key, "video/mp4")
        .await
        .unwrap();
    for next in [
        JobStatus::GeneratingJsons,
        JobStatus::GeneratingVoice,
        JobStatus::GeneratingImages,
        JobStatus::GeneratingVideos,
        JobStatus::Stitching,
    ] {
        app.jobs.transition(&id, next).await.unwrap();
    }
    app.jobs.complete(&id, &key).await.unwrap();

    let (status, body) = send(&app, empty_request("GET", &uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["url"].as_str().unwrap().contains("final.mp4"));
    assert_eq!(body["expires_in_secs"], 3600);
}

#[tokio::test]
async fn test_voices_lists_catalogue() {
    let app = test_app();
    let (status, body) = send(&app, empty_request("GET", "/api/voices")).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body
        .as_array()
        .unwrap()
        .iter()
        .any(|v| v["id"] == VOICE && v["name"] == "Rachel"));
}

#[tokio::test]
async fn test_api_token_required_when_configured() {
    let config = ApiConfig {
        api_token: Some("s3cret".to_string()),
        ..ApiConfig::default()
    };
    let app = test_app_with(config, MemoryDispatcher::new());

    let (status, _) = send(&app, empty_request("GET", "/api/jobs")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let wrong = Request::builder()
        .uri("/api/jobs")
        .header(header::AUTHORIZATION, "Bearer nope")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, wrong).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let right = Request::builder()
        .uri("/api/jobs")
        .header(header::AUTHORIZATION, "Bearer s3cret")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, right).await;
    assert_eq!(status, StatusCode::OK);

    // Probes stay open
    let (status, _) = send(&app, empty_request("GET", "/health")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_rate_limiting_per_client() {
    let config = ApiConfig {
        rate_limit_rps: 1,
        rate_limit_burst: 2,
        ..ApiConfig::default()
    };
    let app = test_app_with(config, MemoryDispatcher::new());

    let from = |ip: &str| {
        Request::builder()
            .uri("/api/voices")
            .header("X-Forwarded-For", ip)
            .body(Body::empty())
            .unwrap()
    };

    let mut limited = false;
    for _ in 0..5 {
        let (status, _) = send(&app, from("192.0.2.10")).await;
        if status == StatusCode::TOO_MANY_REQUESTS {
            limited = true;
            break;
        }
    }
    assert!(limited);

    let (status, _) = send(&app, from("192.0.2.11")).await;
    assert_eq!(status, StatusCode::OK);
}
