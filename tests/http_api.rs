//! HTTP surface tests, driven through the router without a socket.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use scrape_orchestrator::config::OrchestratorConfig;
use scrape_orchestrator::{FetchOrchestrator, FetchRequest, HttpServer, Shutdown};

mod common;
use common::{test_config, upstream_error, FakeSessionFactory};

const LIST: &str = r#"{"data":[{"mal_id":7,"title":"Seven"}]}"#;
const ADMIN_KEY: &str = "test-admin-key";

async fn app(config: OrchestratorConfig, factory: Arc<FakeSessionFactory>) -> (Router, FetchOrchestrator, Shutdown) {
    let (orch, shutdown) = common::orchestrator(config, factory).await;
    let router = HttpServer::new(orch.clone()).router();
    (router, orch, shutdown)
}

fn admin_config() -> OrchestratorConfig {
    let mut config = test_config(2);
    config.pool.max_size = 5;
    config.admin.enabled = true;
    config.admin.api_key = ADMIN_KEY.to_string();
    config
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn admin(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {ADMIN_KEY}"));
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_fetch_returns_processed_json() {
    let factory = FakeSessionFactory::ok_after(LIST, Duration::ZERO);
    let (router, _orch, _shutdown) = app(test_config(1), factory.clone()).await;

    let response = router
        .oneshot(get("/api/fetch?target=Seven&page=1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let body = json_body(response).await;
    assert_eq!(body["data"][0]["mal_id"], 7);
    assert_eq!(factory.counters.fetches(), 1);
}

#[tokio::test]
async fn test_missing_target_is_bad_request() {
    let factory = FakeSessionFactory::ok_after(LIST, Duration::ZERO);
    let (router, _orch, _shutdown) = app(test_config(1), factory.clone()).await;

    let response = router.oneshot(get("/api/fetch?page=2")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_request");
    assert_eq!(factory.counters.fetches(), 0);
}

#[tokio::test]
async fn test_open_circuit_is_service_unavailable() {
    let factory = FakeSessionFactory::new(|_, _| async { Err(upstream_error(503)) });
    let mut config = test_config(1);
    config.retries.max_attempts = 1;
    config.breaker.max_failures = 1;
    let (router, orch, _shutdown) = app(config, factory).await;

    assert!(orch.fetch(FetchRequest::new("first")).await.is_err());

    let response = router.oneshot(get("/api/fetch?target=second")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let retry_after: u64 = response.headers()[header::RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=30).contains(&retry_after));
    assert_eq!(json_body(response).await["error"], "upstream_unavailable");
}

#[tokio::test]
async fn test_exhausted_retries_is_server_error() {
    let factory = FakeSessionFactory::new(|_, _| async { Err(upstream_error(500)) });
    let mut config = test_config(1);
    config.retries.base_delay_ms = 1;
    let (router, _orch, _shutdown) = app(config, factory.clone()).await;

    let response = router.oneshot(get("/api/fetch?target=broken")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["error"], "exhausted_retries");
    assert_eq!(factory.counters.fetches(), 3);
}

#[tokio::test]
async fn test_rate_limit_rejects_burst() {
    let factory = FakeSessionFactory::ok_after(LIST, Duration::ZERO);
    let mut config = test_config(1);
    config.rate_limit.enabled = true;
    config.rate_limit.requests_per_second = 1;
    config.rate_limit.burst_size = 1;
    let (router, _orch, _shutdown) = app(config, factory).await;

    let first = router.clone().oneshot(get("/api/fetch?target=a")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = router.clone().oneshot(get("/api/fetch?target=b")).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

    // Health is outside the limited routes.
    let health = router.oneshot(get("/health")).await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_health_reports_stats() {
    let factory = FakeSessionFactory::ok_after(LIST, Duration::ZERO);
    let (router, _orch, _shutdown) = app(test_config(3), factory).await;

    let response = router.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["stats"]["pool_size"], 3);
    assert_eq!(body["stats"]["queue_capacity"], 32);
}

#[tokio::test]
async fn test_admin_routes_absent_when_disabled() {
    let factory = FakeSessionFactory::ok_after(LIST, Duration::ZERO);
    let (router, _orch, _shutdown) = app(test_config(1), factory).await;

    let response = router.oneshot(admin(Method::GET, "/admin/status", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_requires_key() {
    let factory = FakeSessionFactory::ok_after(LIST, Duration::ZERO);
    let (router, _orch, _shutdown) = app(admin_config(), factory).await;

    let anonymous = router.clone().oneshot(get("/admin/status")).await.unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let wrong = Request::builder()
        .uri("/admin/status")
        .header(header::AUTHORIZATION, "Bearer nope")
        .body(Body::empty())
        .unwrap();
    assert_eq!(router.clone().oneshot(wrong).await.unwrap().status(), StatusCode::UNAUTHORIZED);

    let response = router.oneshot(admin(Method::GET, "/admin/status", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["stats"]["pool_size"], 2);
}

#[tokio::test]
async fn test_admin_scale_pool() {
    let factory = FakeSessionFactory::ok_after(LIST, Duration::ZERO);
    let (router, orch, _shutdown) = app(admin_config(), factory).await;

    let response = router
        .clone()
        .oneshot(admin(Method::POST, "/admin/pool/scale", Some(json!({ "size": 50 }))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "requested": 50, "size": 5 }));
    assert_eq!(orch.stats().await.pool_size, 5);

    let response = router.oneshot(admin(Method::GET, "/admin/pool", None)).await.unwrap();
    let body = json_body(response).await;
    assert_eq!(body["workers"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_admin_config_patch() {
    let factory = FakeSessionFactory::ok_after(LIST, Duration::ZERO);
    let (router, orch, _shutdown) = app(admin_config(), factory).await;

    let rejected = router
        .clone()
        .oneshot(admin(
            Method::PATCH,
            "/admin/config",
            Some(json!({ "queue": { "max_concurrency": 0 } })),
        ))
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(rejected).await;
    assert_eq!(body["error"], "validation_failed");
    assert_eq!(body["errors"][0]["field"], "queue.max_concurrency");

    let malformed = router
        .clone()
        .oneshot(admin(
            Method::PATCH,
            "/admin/config",
            Some(json!({ "retries": { "max_attempts": "lots" } })),
        ))
        .await
        .unwrap();
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);

    let accepted = router
        .oneshot(admin(
            Method::PATCH,
            "/admin/config",
            Some(json!({ "queue": { "max_concurrency": 4 } })),
        ))
        .await
        .unwrap();
    assert_eq!(accepted.status(), StatusCode::OK);
    assert_eq!(json_body(accepted).await["queue"]["max_concurrency"], 4);
    assert_eq!(orch.stats().await.queue_capacity, 4);
}

#[tokio::test]
async fn test_admin_breakers_and_cache() {
    let factory = FakeSessionFactory::ok_after(LIST, Duration::ZERO);
    let (router, orch, _shutdown) = app(admin_config(), factory).await;
    orch.fetch(FetchRequest::new("cached")).await.unwrap();

    let missing = router
        .clone()
        .oneshot(admin(Method::GET, "/admin/breakers/nowhere.example", None))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let known = router
        .clone()
        .oneshot(admin(Method::GET, "/admin/breakers/api.jikan.moe", None))
        .await
        .unwrap();
    assert_eq!(known.status(), StatusCode::OK);
    assert_eq!(json_body(known).await["state"], "closed");

    let cleared = router
        .oneshot(admin(Method::DELETE, "/admin/cache", None))
        .await
        .unwrap();
    assert_eq!(json_body(cleared).await["removed"], 1);
    assert_eq!(orch.stats().await.cache_entries, 0);
}
