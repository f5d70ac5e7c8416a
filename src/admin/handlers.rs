use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::ConfigError;
use crate::http::error::ApiError;
use crate::http::server::AppState;
use crate::orchestrator::{OrchestratorStats, RotateReport};
use crate::proxy::ProxyStatus;
use crate::resilience::BreakerSnapshot;
use crate::worker::WorkerStatus;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub stats: OrchestratorStats,
}

#[derive(Serialize)]
pub struct PoolStatus {
    pub size: usize,
    pub busy: usize,
    pub peak_busy: usize,
    pub min_size: usize,
    pub max_size: usize,
    pub workers: Vec<WorkerStatus>,
}

#[derive(Deserialize)]
pub struct ScaleRequest {
    pub size: usize,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        stats: state.orchestrator.stats().await,
    })
}

pub async fn get_pool(State(state): State<AppState>) -> Json<PoolStatus> {
    let config = state.orchestrator.config();
    let stats = state.orchestrator.stats().await;
    Json(PoolStatus {
        size: stats.pool_size,
        busy: stats.busy_workers,
        peak_busy: stats.peak_busy_workers,
        min_size: config.pool.min_size,
        max_size: config.pool.max_size,
        workers: state.orchestrator.workers().await,
    })
}

pub async fn scale_pool(
    State(state): State<AppState>,
    Json(body): Json<ScaleRequest>,
) -> Result<Json<Value>, ApiError> {
    let size = state.orchestrator.scale_pool(body.size).await?;
    Ok(Json(json!({ "requested": body.size, "size": size })))
}

pub async fn get_proxies(State(state): State<AppState>) -> Json<Vec<ProxyStatus>> {
    Json(state.orchestrator.proxies())
}

pub async fn rotate_proxies(State(state): State<AppState>) -> Result<Json<RotateReport>, ApiError> {
    Ok(Json(state.orchestrator.rotate_proxies().await?))
}

pub async fn get_breakers(State(state): State<AppState>) -> Json<Vec<BreakerSnapshot>> {
    Json(state.orchestrator.breakers())
}

pub async fn get_breaker(
    State(state): State<AppState>,
    Path(target): Path<String>,
) -> Result<Json<BreakerSnapshot>, StatusCode> {
    state
        .orchestrator
        .breaker_state(&target)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn get_config(State(state): State<AppState>) -> Response {
    Json(&*state.orchestrator.config()).into_response()
}

pub async fn patch_config(State(state): State<AppState>, Json(patch): Json<Value>) -> Response {
    match state.orchestrator.update_config(patch).await {
        Ok(config) => Json(&*config).into_response(),
        Err(ConfigError::Validation(errors)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "validation_failed", "errors": errors })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_patch", "message": e.to_string() })),
        )
            .into_response(),
    }
}

pub async fn clear_cache(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "removed": state.orchestrator.clear_cache() }))
}
