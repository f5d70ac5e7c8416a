//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (sizes, timeouts, ratios)
//! - Check that addresses and URLs parse
//!
//! Returns all validation errors, not just the first.

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::OrchestratorConfig;
use crate::proxy::entry::parse_address;

/// Upper bound for every TTL, interval and timeout setting (one year).
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// A single failed check.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration before it is accepted into the system.
pub fn validate_config(config: &OrchestratorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if url::Url::parse(&config.upstream.base_url).is_err() {
        errors.push(ValidationError::new(
            "upstream.base_url",
            format!("'{}' is not a URL", config.upstream.base_url),
        ));
    }
    if !config.upstream.processing.items_pointer.is_empty()
        && !config.upstream.processing.items_pointer.starts_with('/')
    {
        errors.push(ValidationError::new(
            "upstream.processing.items_pointer",
            "must be empty or start with '/'",
        ));
    }

    for raw in &config.proxies.static_proxies {
        if parse_address(raw).is_none() {
            errors.push(ValidationError::new(
                "proxies.static_proxies",
                format!("'{raw}' is not host:port"),
            ));
        }
    }
    for source in &config.proxies.sources {
        if url::Url::parse(source).is_err() {
            errors.push(ValidationError::new(
                "proxies.sources",
                format!("'{source}' is not a URL"),
            ));
        }
    }
    if config.proxies.health_check_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "proxies.health_check_timeout_secs",
            "must be greater than 0",
        ));
    }

    let pool = &config.pool;
    if pool.min_size == 0 {
        errors.push(ValidationError::new("pool.min_size", "must be at least 1"));
    }
    if pool.max_size < pool.min_size {
        errors.push(ValidationError::new(
            "pool.max_size",
            format!("{} is below min_size {}", pool.max_size, pool.min_size),
        ));
    }
    if pool.initial_size < pool.min_size || pool.initial_size > pool.max_size {
        errors.push(ValidationError::new(
            "pool.initial_size",
            format!(
                "{} is outside [{}, {}]",
                pool.initial_size, pool.min_size, pool.max_size
            ),
        ));
    }

    if config.queue.max_concurrency == 0 {
        errors.push(ValidationError::new("queue.max_concurrency", "must be at least 1"));
    }

    if config.breaker.max_failures == 0 {
        errors.push(ValidationError::new("breaker.max_failures", "must be at least 1"));
    }

    if config.retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be at least 1"));
    }
    if !(0.0..=1.0).contains(&config.retries.jitter) {
        errors.push(ValidationError::new(
            "retries.jitter",
            format!("{} is outside [0, 1]", config.retries.jitter),
        ));
    }

    if config.timeouts.attempt_secs == 0 {
        errors.push(ValidationError::new("timeouts.attempt_secs", "must be greater than 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    let durations: [(&'static str, u64); 11] = [
        ("cache.search_ttl_secs", config.cache.search_ttl_secs),
        ("cache.detail_ttl_secs", config.cache.detail_ttl_secs),
        ("cache.video_links_ttl_secs", config.cache.video_links_ttl_secs),
        ("cache.sweep_interval_secs", config.cache.sweep_interval_secs),
        ("pool.autoscale_interval_secs", config.pool.autoscale_interval_secs),
        ("proxies.refresh_interval_secs", config.proxies.refresh_interval_secs),
        ("proxies.health_check_interval_secs", config.proxies.health_check_interval_secs),
        ("proxies.health_check_timeout_secs", config.proxies.health_check_timeout_secs),
        ("breaker.cooldown_secs", config.breaker.cooldown_secs),
        ("timeouts.attempt_secs", config.timeouts.attempt_secs),
        ("timeouts.request_secs", config.timeouts.request_secs),
    ];
    for (field, secs) in durations {
        if secs > MAX_DURATION_SECS {
            errors.push(ValidationError::new(
                field,
                format!("{secs}s exceeds the {MAX_DURATION_SECS}s maximum"),
            ));
        }
    }
    if config.retries.max_delay_ms / 1000 > MAX_DURATION_SECS {
        errors.push(ValidationError::new("retries.max_delay_ms", "exceeds one year"));
    }
    if config
        .queue
        .enqueue_timeout_ms
        .is_some_and(|ms| ms / 1000 > MAX_DURATION_SECS)
    {
        errors.push(ValidationError::new("queue.enqueue_timeout_ms", "exceeds one year"));
    }

    if config.rate_limit.enabled && config.rate_limit.requests_per_second == 0 {
        errors.push(ValidationError::new(
            "rate_limit.requests_per_second",
            "must be greater than 0 when rate limiting is enabled",
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
