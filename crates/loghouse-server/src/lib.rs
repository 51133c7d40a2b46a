//! Loghouse HTTP API
//!
//! Thin JSON adapters over [`LogStore`]:
//!
//! - `POST /write` — ingest one record, echo it back on success
//! - `POST /query` — run a filtered range query, return matching records
//! - `POST /stop` — halt the background flusher (no final flush)
//!
//! The handlers do no storage work themselves; every decision lives in the
//! storage engine.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing::error;

use loghouse_core::LogRecord;
use loghouse_storage::{LogStore, Query};

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<LogStore>,
}

/// Create the API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/write", post(write))
        .route("/query", post(query))
        .route("/stop", post(stop))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn write(
    State(state): State<AppState>,
    Json(record): Json<LogRecord>,
) -> Result<Json<LogRecord>, (StatusCode, String)> {
    state.store.append(record.clone()).await.map_err(|err| {
        error!(error = %err, "Write failed");
        (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    })?;
    Ok(Json(record))
}

async fn query(
    State(state): State<AppState>,
    Json(query): Json<Query>,
) -> Result<Json<Vec<LogRecord>>, (StatusCode, String)> {
    let results = state.store.query(&query).await.map_err(|err| {
        error!(error = %err, "Query failed");
        (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    })?;
    Ok(Json(results))
}

async fn stop(State(state): State<AppState>) -> (StatusCode, &'static str) {
    state.store.stop_background_flush().await;
    (StatusCode::ACCEPTED, "ok")
}
