//! Health and status handlers
//!
//! `/health` is liveness: the process is up and serving. `/ready` is
//! readiness: the backing services the request path depends on are
//! actually reachable.

use crate::error::AppError;
use crate::state::AppState;
use axum::http::StatusCode;
use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

/// Health check response
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status
    #[schema(example = "ok")]
    pub status: String,
    /// Uptime in seconds
    pub uptime_secs: u64,
    /// Requests served since start
    pub requests: u64,
    /// Jobs waiting to be processed
    pub queued_jobs: u64,
    /// Jobs currently being processed
    pub running_jobs: u64,
    /// Permanently failed jobs
    pub dead_jobs: u64,
}

/// Service health with queue counters
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, AppError> {
    let depth = state.queue.depth().await?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.uptime_secs(),
        requests: state
            .request_count
            .load(std::sync::atomic::Ordering::SeqCst),
        queued_jobs: depth.queued,
        running_jobs: depth.running,
        dead_jobs: depth.dead,
    }))
}

/// Readiness check response
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    /// Whether all dependencies are reachable
    pub ready: bool,
    /// Job queue reachability
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_error: Option<String>,
    /// Vector store reachability
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_store_error: Option<String>,
}

/// Readiness of the backing services
#[utoipa::path(
    get,
    path = "/ready",
    tag = "health",
    responses(
        (status = 200, description = "All dependencies reachable", body = ReadyResponse),
        (status = 503, description = "A dependency is unavailable", body = ReadyResponse)
    )
)]
pub async fn ready(State(state): State<Arc<AppState>>) -> (StatusCode, Json<ReadyResponse>) {
    let queue_error = state.queue.depth().await.err().map(|e| e.to_string());
    // collection bootstrap is idempotent, so it doubles as the reachability check
    let vector_store_error = state
        .store
        .ensure_collection()
        .await
        .err()
        .map(|e| e.to_string());

    let ready = queue_error.is_none() && vector_store_error.is_none();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyResponse {
            ready,
            queue_error,
            vector_store_error,
        }),
    )
}
