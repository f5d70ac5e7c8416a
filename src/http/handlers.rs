//! Public API handlers.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::error::FetchError;
use crate::http::error::ApiError;
use crate::http::server::AppState;
use crate::orchestrator::{FetchRequest, RequestKind};

/// Query string of `GET /api/fetch`.
#[derive(Debug, Deserialize)]
pub struct FetchParams {
    pub target: String,
    #[serde(default)]
    pub kind: RequestKind,
    pub page: Option<u32>,
    #[serde(default)]
    pub priority: u8,
    pub timeout_ms: Option<u64>,
}

impl From<FetchParams> for FetchRequest {
    fn from(params: FetchParams) -> Self {
        FetchRequest {
            target: params.target,
            kind: params.kind,
            page: params.page,
            priority: params.priority,
            timeout_ms: params.timeout_ms,
        }
    }
}

pub async fn fetch_handler(
    State(state): State<AppState>,
    params: Result<Query<FetchParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = params.map_err(|e| FetchError::InvalidRequest(e.body_text()))?;
    let value = state.orchestrator.fetch(params.into()).await?;
    Ok(Json(&*value).into_response())
}

pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.orchestrator.stats().await;
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "stats": stats,
    }))
}
