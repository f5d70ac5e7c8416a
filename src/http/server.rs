//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router with the public and admin routes
//! - Wire up middleware (request ID, tracing, timeout, rate limiting)
//! - Serve until the shutdown broadcast fires

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderName;
use axum::middleware;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::admin::setup_admin_router;
use crate::http::handlers::{fetch_handler, health_handler};
use crate::orchestrator::FetchOrchestrator;
use crate::security::rate_limit::{rate_limit_middleware, RateLimiterState};

pub const X_REQUEST_ID: &str = "x-request-id";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: FetchOrchestrator,
    pub limiter: Arc<RateLimiterState>,
}

/// HTTP front end for the orchestrator.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(orchestrator: FetchOrchestrator) -> Self {
        let limiter = Arc::new(RateLimiterState::new(orchestrator.config_handle()));
        let state = AppState { orchestrator, limiter };
        Self {
            router: Self::build_router(state),
        }
    }

    /// The fully layered router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    #[allow(deprecated)]
    fn build_router(state: AppState) -> Router {
        let config = state.orchestrator.config();
        let request_id = HeaderName::from_static(X_REQUEST_ID);

        let api = Router::new()
            .route("/api/fetch", get(fetch_handler))
            .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit_middleware));

        let mut router = Router::new()
            .merge(api)
            .route("/health", get(health_handler));

        if config.admin.enabled {
            router = router.nest("/admin", setup_admin_router(state.clone()));
        }

        router
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::new(request_id.clone()))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
