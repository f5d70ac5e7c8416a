//! Per-client rate limiting for the public API.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::config::ConfigHandle;
use crate::http::server::AppState;

/// Bucket count above which idle buckets are dropped.
const PRUNE_THRESHOLD: usize = 10_000;
const IDLE_BUCKET_TTL: Duration = Duration::from_secs(300);

/// A simple token bucket rate limiter.
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Buckets keyed by client IP. Limits are read from the live config.
pub struct RateLimiterState {
    buckets: Mutex<HashMap<String, TokenBucket>>,
    config: Arc<ConfigHandle>,
}

impl RateLimiterState {
    pub fn new(config: Arc<ConfigHandle>) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Take a token for `key`. Always succeeds while limiting is disabled.
    pub fn check(&self, key: &str) -> bool {
        let limits = self.config.load().rate_limit.clone();
        if !limits.enabled {
            return true;
        }

        let rps = limits.requests_per_second as f64;
        let burst = limits.burst_size.max(1) as f64;

        let mut buckets = self.buckets.lock().expect("rate limiter mutex poisoned");
        if buckets.len() >= PRUNE_THRESHOLD {
            prune_idle(&mut buckets, IDLE_BUCKET_TTL);
        }
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(burst));
        bucket.try_acquire(burst, rps)
    }

    /// Drop buckets untouched for `idle`. Returns how many were dropped.
    pub fn prune(&self, idle: Duration) -> usize {
        let mut buckets = self.buckets.lock().expect("rate limiter mutex poisoned");
        prune_idle(&mut buckets, idle)
    }
}

fn prune_idle(buckets: &mut HashMap<String, TokenBucket>, idle: Duration) -> usize {
    let before = buckets.len();
    buckets.retain(|_, bucket| bucket.last_update.elapsed() < idle);
    before - buckets.len()
}

/// Middleware rejecting clients over their budget with 429.
pub async fn rate_limit_middleware(State(state): State<AppState>, request: Request<Body>, next: Next) -> Response {
    let key = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    if state.limiter.check(&key) {
        next.run(request).await
    } else {
        tracing::warn!(client = %key, "Rate limit exceeded");
        (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "rate_limited", "message": "Rate limit exceeded" })),
        )
            .into_response()
    }
}
