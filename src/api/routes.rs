//! API route definitions.
//!
//! - `GET  /api/health`
//! - `GET  /api/monitor/responses[?limit=N]` -- history, newest first
//! - `POST /api/monitor/trigger` -- run one probe now; `null` if it could not be stored
//! - `GET  /api/monitor/stats` -- summary over the default history window

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::state::AppState;
use crate::analysis::stats::MonitorStats;
use crate::storage::{ProbeResult, StorageError, DEFAULT_RECENT_LIMIT};

type ApiError = (StatusCode, Json<Value>);

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/monitor/responses", get(list_responses))
        .route("/monitor/trigger", post(trigger))
        .route("/monitor/stats", get(stats))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

fn storage_error(e: StorageError) -> ApiError {
    tracing::error!("History read failed: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn list_responses(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ProbeResult>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_RECENT_LIMIT);
    let results = state.monitor.recent(limit).await.map_err(storage_error)?;
    Ok(Json(results))
}

async fn trigger(State(state): State<AppState>) -> Json<Option<ProbeResult>> {
    tracing::info!("Manual probe requested");
    Json(state.monitor.run_once().await)
}

async fn stats(State(state): State<AppState>) -> Result<Json<MonitorStats>, ApiError> {
    let results = state
        .monitor
        .recent(DEFAULT_RECENT_LIMIT)
        .await
        .map_err(storage_error)?;
    Ok(Json(MonitorStats::from_results(&results)))
}
