//! HTTP API Tests
//!
//! Drive the router in-process with `tower::ServiceExt::oneshot`; no sockets
//! involved.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use loghouse_server::{create_router, AppState};
use loghouse_storage::{LogStore, StoreConfig};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

async fn setup(dir: &TempDir) -> (axum::Router, Arc<LogStore>) {
    let store = Arc::new(
        LogStore::open(StoreConfig {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        })
        .await
        .unwrap(),
    );
    (create_router(AppState { store: store.clone() }), store)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn sample_record() -> Value {
    json!({
        "Timestamp": 1_700_000_000_000_i64,
        "Level": "ERROR",
        "Service": "auth",
        "Host": "web-1",
        "Message": "failed login",
        "StackTrace": "",
        "Properties": {"module": "auth"}
    })
}

#[tokio::test]
async fn test_write_echoes_record() {
    let dir = TempDir::new().unwrap();
    let (router, _store) = setup(&dir).await;

    let response = router.oneshot(post("/write", sample_record())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let echoed: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(echoed["Level"], "ERROR");
    assert_eq!(echoed["Message"], "failed login");
    assert_eq!(echoed["Properties"]["module"], "auth");
}

#[tokio::test]
async fn test_write_rejects_bad_body() {
    let dir = TempDir::new().unwrap();
    let (router, _store) = setup(&dir).await;

    let request = Request::builder()
        .method("POST")
        .uri("/write")
        .header("content-type", "application/json")
        .body(Body::from("{\"Timestamp\": not json"))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert!(response.status().is_client_error());

    // valid JSON, unknown level
    let mut bad_level = sample_record();
    bad_level["Level"] = json!("FATAL");
    let response = router.oneshot(post("/write", bad_level)).await.unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_query_returns_flushed_records() {
    let dir = TempDir::new().unwrap();
    let (router, store) = setup(&dir).await;

    let response = router
        .clone()
        .oneshot(post("/write", sample_record()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    store.flush().await.unwrap();

    let query = json!({
        "StartTime": 1_700_000_000_000_i64,
        "EndTime": 1_700_000_001_000_i64,
        "Filters": [{"Field": "Level", "Value": "ERROR"}],
        "SortAsc": true
    });
    let response = router.oneshot(post("/query", query)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let results: Vec<Value> = serde_json::from_slice(&body).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["Message"], "failed login");
}

#[tokio::test]
async fn test_query_with_empty_body_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let (router, _store) = setup(&dir).await;

    let response = router.oneshot(post("/query", json!({}))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let results: Vec<Value> = serde_json::from_slice(&body).unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_stop_halts_background_flusher() {
    let dir = TempDir::new().unwrap();
    let (router, store) = setup(&dir).await;
    store.start_background_flush().await;

    let response = router
        .oneshot(Request::builder().method("POST").uri("/stop").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"ok");
}
