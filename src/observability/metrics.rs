//! Metrics hooks.
//!
//! The core reports through [`MetricsSink`] and never owns the reporting
//! mechanism. Every hook defaults to a no-op, so embedders implement only
//! what they export.
//!
//! # Metrics (PrometheusMetrics)
//! - `fetch_duration_seconds` (histogram): by kind and outcome
//! - `fetch_total` (counter): by kind and outcome
//! - `cache_lookups_total` (counter): by result (hit/miss)
//! - `fetch_coalesced_total` (counter)
//! - `breaker_transitions_total` (counter): by target, from, to
//! - `worker_pool_size` (gauge), `worker_recycled_total` (counter)
//! - `proxies_healthy` / `proxies_dead` (gauges)

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::orchestrator::RequestKind;
use crate::resilience::CircuitState;

/// Callbacks the core invokes while it works.
pub trait MetricsSink: Send + Sync {
    fn cache_lookup(&self, _hit: bool) {}

    fn fetch_completed(&self, _kind: RequestKind, _outcome: &'static str, _elapsed: Duration) {}

    fn fetch_coalesced(&self) {}

    fn breaker_transition(&self, _target: &str, _from: CircuitState, _to: CircuitState) {}

    fn pool_resized(&self, _size: usize) {}

    fn worker_recycled(&self) {}

    fn proxy_health(&self, _healthy: usize, _dead: usize) {}
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {}

/// Sink backed by the `metrics` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrometheusMetrics;

impl MetricsSink for PrometheusMetrics {
    fn cache_lookup(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        counter!("cache_lookups_total", "result" => result).increment(1);
    }

    fn fetch_completed(&self, kind: RequestKind, outcome: &'static str, elapsed: Duration) {
        counter!("fetch_total", "kind" => kind.as_str(), "outcome" => outcome).increment(1);
        histogram!("fetch_duration_seconds", "kind" => kind.as_str(), "outcome" => outcome)
            .record(elapsed.as_secs_f64());
    }

    fn fetch_coalesced(&self) {
        counter!("fetch_coalesced_total").increment(1);
    }

    fn breaker_transition(&self, target: &str, from: CircuitState, to: CircuitState) {
        counter!(
            "breaker_transitions_total",
            "target" => target.to_string(),
            "from" => from.as_str(),
            "to" => to.as_str()
        )
        .increment(1);
    }

    fn pool_resized(&self, size: usize) {
        gauge!("worker_pool_size").set(size as f64);
    }

    fn worker_recycled(&self) {
        counter!("worker_recycled_total").increment(1);
    }

    fn proxy_health(&self, healthy: usize, dead: usize) {
        gauge!("proxies_healthy").set(healthy as f64);
        gauge!("proxies_dead").set(dead as f64);
    }
}

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}
