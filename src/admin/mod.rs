//! Admin API.
//!
//! Mounted under `/admin` when `admin.enabled` is set. Every route requires
//! the configured bearer key.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_admin_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/status", get(get_status))
        .route("/pool", get(get_pool))
        .route("/pool/scale", post(scale_pool))
        .route("/proxies", get(get_proxies))
        .route("/proxies/rotate", post(rotate_proxies))
        .route("/breakers", get(get_breakers))
        .route("/breakers/{target}", get(get_breaker))
        .route("/config", get(get_config).patch(patch_config))
        .route("/cache", axum::routing::delete(clear_cache))
        .route_layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}
