//! Integration tests for the mosaic server API
//!
//! Tests the complete API surface including:
//! - Health checks
//! - Grid snapshot read/replace
//! - Media blob storage
//! - Composition endpoint validation

use axum::http::StatusCode;
use base64::Engine as _;
use mosaic_common::events::EventBus;
use mosaic_common::model::GridState;
use mosaic_common::SLOT_COUNT;
use serde_json::{json, Value};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use uuid::Uuid;

use mosaic_server::api::{build_router, AppContext};
use mosaic_server::config::PipelineConfig;
use mosaic_server::notify::NullNotifier;
use mosaic_server::pipeline::{ffmpeg::FfmpegClient, CompositionPipeline};
use mosaic_server::storage::MediaStore;

/// Test helper to create a router over an in-memory database and a
/// temporary media root. The TempDir must outlive the router.
async fn setup_test_server() -> (axum::Router, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_pool = mosaic_server::db::init_memory_pool()
        .await
        .expect("Failed to create database");
    let media = Arc::new(
        MediaStore::new(dir.path(), "http://localhost:5750").expect("Failed to open media store"),
    );
    let bus = EventBus::new(16);
    // /bin/true stands in for ffmpeg; no test below reaches a transcode
    let pipeline = Arc::new(
        CompositionPipeline::new(
            FfmpegClient::new("true").expect("true binary missing"),
            Arc::clone(&media),
            Arc::new(NullNotifier),
            bus.clone(),
            PipelineConfig::default(),
            1_000_000,
        )
        .expect("Failed to build pipeline"),
    );

    let ctx = AppContext {
        db_pool,
        media,
        pipeline,
        bus,
        grid_version: Arc::new(AtomicU64::new(0)),
    };
    (build_router(ctx), dir)
}

/// Helper function to make HTTP requests to the test server
async fn make_request(
    app: &axum::Router,
    method: &str,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Option<Value>) {
    use axum::body::Body;
    use http::{Method, Request};
    use tower::ServiceExt;

    let method = match method {
        "GET" => Method::GET,
        "POST" => Method::POST,
        "PUT" => Method::PUT,
        _ => panic!("Unsupported method"),
    };

    let mut request = Request::builder().method(method).uri(path);
    if body.is_some() {
        request = request.header("content-type", "application/json");
    }
    let request = if let Some(json_body) = body {
        request.body(Body::from(json_body.to_string())).unwrap()
    } else {
        request.body(Body::empty()).unwrap()
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json_body = if !bytes.is_empty() {
        serde_json::from_slice(&bytes).ok()
    } else {
        None
    };

    (status, json_body)
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _dir) = setup_test_server().await;

    let (status, body) = make_request(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    let body = body.expect("Expected response body");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "mosaic-server");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_grid_defaults_when_absent() {
    let (app, _dir) = setup_test_server().await;

    // Fresh database still yields a well-formed empty grid
    let (status, body) = make_request(&app, "GET", "/grid", None).await;
    assert_eq!(status, StatusCode::OK);
    let grid: GridState = serde_json::from_value(body.unwrap()).unwrap();
    assert_eq!(grid.slots.len(), SLOT_COUNT);
    assert!(grid.contributions.is_empty());
    assert!(!grid.is_complete());
}

#[tokio::test]
async fn test_grid_replace_round_trip() {
    let (app, _dir) = setup_test_server().await;

    let mut state = GridState::new_generation();
    state.slots[3].video = Some(mosaic_common::model::MediaRef::new("clip-3"));
    let generation = state.generation;

    let (status, _) = make_request(&app, "PUT", "/grid", Some(json!(state))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Current pointer follows the replace
    let (status, body) = make_request(&app, "GET", "/grid", None).await;
    assert_eq!(status, StatusCode::OK);
    let loaded: GridState = serde_json::from_value(body.unwrap()).unwrap();
    assert_eq!(loaded.generation, generation);
    assert_eq!(loaded.slots[3].video.as_ref().unwrap().as_str(), "clip-3");

    // The generation-addressed route returns the same snapshot
    let (status, body) = make_request(&app, "GET", &format!("/grid/{generation}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let by_generation: GridState = serde_json::from_value(body.unwrap()).unwrap();
    assert_eq!(by_generation, loaded);
}

#[tokio::test]
async fn test_grid_replace_rejects_wrong_slot_count() {
    let (app, _dir) = setup_test_server().await;

    let mut state = GridState::new_generation();
    state.slots.pop();
    let (status, body) = make_request(&app, "PUT", "/grid", Some(json!(state))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.unwrap()["error"].as_str().unwrap().contains("16"));

    // The malformed replace did not disturb the current snapshot
    let (_, body) = make_request(&app, "GET", "/grid", None).await;
    let current: GridState = serde_json::from_value(body.unwrap()).unwrap();
    assert_eq!(current.slots.len(), SLOT_COUNT);
}

#[tokio::test]
async fn test_unknown_generation_yields_empty_grid() {
    let (app, _dir) = setup_test_server().await;

    let generation = Uuid::new_v4();
    let (status, body) = make_request(&app, "GET", &format!("/grid/{generation}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let grid: GridState = serde_json::from_value(body.unwrap()).unwrap();
    assert_eq!(grid.generation, generation);
    assert_eq!(grid.slots.len(), SLOT_COUNT);
}

#[tokio::test]
async fn test_media_upload_resolve_fetch() {
    let (app, _dir) = setup_test_server().await;

    let content = base64::engine::general_purpose::STANDARD.encode(b"fake video bytes");
    let (status, body) = make_request(
        &app,
        "POST",
        "/media",
        Some(json!({ "uri": "blob:local-recording", "content": content })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let key = body.unwrap()["key"].as_str().unwrap().to_string();

    let (status, body) = make_request(&app, "GET", &format!("/media/{key}/url"), None).await;
    assert_eq!(status, StatusCode::OK);
    let url = body.unwrap()["url"].as_str().unwrap().to_string();
    assert!(url.ends_with(&format!("/media/{key}/raw")));

    use tower::ServiceExt;
    let response = app
        .clone()
        .oneshot(
            http::Request::builder()
                .method(http::Method::GET)
                .uri(format!("/media/{key}/raw"))
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"fake video bytes");
}

#[tokio::test]
async fn test_media_upload_rejects_bad_base64() {
    let (app, _dir) = setup_test_server().await;

    let (status, body) = make_request(
        &app,
        "POST",
        "/media",
        Some(json!({ "uri": "blob:x", "content": "not//valid==base64!!" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.unwrap()["error"].as_str().unwrap().contains("base64"));
}

#[tokio::test]
async fn test_resolve_unknown_media_is_404() {
    let (app, _dir) = setup_test_server().await;

    let (status, _) = make_request(&app, "GET", "/media/no-such-key/url", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_merge_rejects_wrong_take_count() {
    let (app, _dir) = setup_test_server().await;

    let (status, body) = make_request(
        &app,
        "POST",
        "/compose/merge",
        Some(json!({ "takes": ["a", "b"] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.unwrap()["error"].as_str().unwrap().contains("3"));
}

#[tokio::test]
async fn test_merge_rejects_unknown_reference() {
    let (app, _dir) = setup_test_server().await;

    let (status, body) = make_request(
        &app,
        "POST",
        "/compose/merge",
        Some(json!({ "takes": ["missing-1", "missing-2", "missing-3"] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.unwrap()["error"]
        .as_str()
        .unwrap()
        .contains("unknown media reference"));
}

#[tokio::test]
async fn test_finalize_rejects_wrong_slot_count() {
    let (app, _dir) = setup_test_server().await;

    let slots: Vec<String> = (0..15).map(|i| format!("clip-{i}")).collect();
    let (status, body) = make_request(
        &app,
        "POST",
        "/compose/finalize",
        Some(json!({ "slots": slots })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.unwrap()["error"].as_str().unwrap().contains("16"));
}
