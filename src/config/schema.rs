//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the orchestrator.
//! All types derive Serde traits for deserialization from config files and
//! for the JSON merge used by runtime updates.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::orchestrator::RequestKind;
use crate::resilience::backoff::BackoffStrategy;

/// Root configuration for the fetch orchestrator.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// HTTP listener for the API surface.
    pub listener: ListenerConfig,

    /// Upstream metadata API and result shaping.
    pub upstream: UpstreamConfig,

    /// Proxy sources, user agents and health checking.
    pub proxies: ProxyConfig,

    /// Worker pool sizing.
    pub pool: PoolConfig,

    /// Task queue capacity.
    pub queue: QueueConfig,

    /// Circuit breaker thresholds.
    pub breaker: BreakerConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Result cache TTLs.
    pub cache: CacheConfig,

    /// Caller-side rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Upstream API the sessions talk to when a request target is not a URL.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the metadata API.
    pub base_url: String,

    /// Path appended to `base_url` for search queries.
    pub search_path: String,

    /// Path prefix for detail lookups by id.
    pub detail_path: String,

    /// How successful responses are filtered and sorted.
    pub processing: ProcessingRules,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.jikan.moe/v4".to_string(),
            search_path: "/anime".to_string(),
            detail_path: "/anime".to_string(),
            processing: ProcessingRules::default(),
        }
    }
}

/// Post-processing applied to JSON list responses.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ProcessingRules {
    /// JSON pointer to the result array.
    pub items_pointer: String,

    /// Items sharing this key are collapsed to the first occurrence.
    pub dedupe_key: Option<String>,

    /// Numeric key to sort items by.
    pub sort_key: Option<String>,

    /// Sort direction.
    pub descending: bool,
}

impl Default for ProcessingRules {
    fn default() -> Self {
        Self {
            items_pointer: "/data".to_string(),
            dedupe_key: Some("mal_id".to_string()),
            sort_key: None,
            descending: true,
        }
    }
}

/// Proxy pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Proxies that are always part of the pool ("host:port").
    pub static_proxies: Vec<String>,

    /// URLs returning plain "host:port" lists.
    pub sources: Vec<String>,

    /// User agents rotated across workers. Empty uses a built-in list.
    pub user_agents: Vec<String>,

    /// Interval between source refreshes in seconds.
    pub refresh_interval_secs: u64,

    /// Interval between health-check sweeps in seconds.
    pub health_check_interval_secs: u64,

    /// Reachability target probed through each proxy.
    pub health_check_target: String,

    /// Per-probe timeout in seconds.
    pub health_check_timeout_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            static_proxies: Vec::new(),
            sources: Vec::new(),
            user_agents: Vec::new(),
            refresh_interval_secs: 600,
            health_check_interval_secs: 120,
            health_check_target: "http://www.gstatic.com/generate_204".to_string(),
            health_check_timeout_secs: 5,
        }
    }
}

impl ProxyConfig {
    pub fn has_sources(&self) -> bool {
        !self.static_proxies.is_empty() || !self.sources.is_empty()
    }
}

/// Worker pool sizing.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PoolConfig {
    /// Workers created at startup.
    pub initial_size: usize,

    /// Floor the pool never shrinks below.
    pub min_size: usize,

    /// Ceiling the pool never grows above.
    pub max_size: usize,

    /// Resize from queue depth in the background.
    pub autoscale: bool,

    /// Autoscaler tick in seconds.
    pub autoscale_interval_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_size: 4,
            min_size: 2,
            max_size: 10,
            autoscale: true,
            autoscale_interval_secs: 5,
        }
    }
}

impl PoolConfig {
    /// Clamp a requested size to `[min_size, max_size]`.
    pub fn clamp(&self, size: usize) -> usize {
        size.clamp(self.min_size, self.max_size.max(self.min_size))
    }
}

/// Task queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    /// Tasks admitted at once (queued + executing).
    pub max_concurrency: usize,

    /// How long `enqueue` waits for capacity. `None` waits indefinitely.
    pub enqueue_timeout_ms: Option<u64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 32,
            enqueue_timeout_ms: None,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failed fetches before the circuit opens.
    pub max_failures: u32,

    /// Time the circuit stays open before a trial call, in seconds.
    pub cooldown_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            cooldown_secs: 30,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts per fetch (including the first).
    pub max_attempts: u32,

    /// Base delay in milliseconds.
    pub base_delay_ms: u64,

    /// Upper bound on a single backoff delay in milliseconds.
    pub max_delay_ms: u64,

    /// Random extra delay as a fraction of the computed delay (0.0 - 1.0).
    pub jitter: f64,

    /// Delay growth between attempts.
    pub strategy: BackoffStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter: 0.0,
            strategy: BackoffStrategy::Linear,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for a single fetch attempt in seconds.
    pub attempt_secs: u64,

    /// Deadline for a whole HTTP request in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            attempt_secs: 15,
            request_secs: 60,
        }
    }
}

impl TimeoutConfig {
    pub fn attempt(&self) -> Duration {
        Duration::from_secs(self.attempt_secs)
    }
}

/// Result cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL for search results in seconds.
    pub search_ttl_secs: u64,

    /// TTL for detail lookups in seconds.
    pub detail_ttl_secs: u64,

    /// TTL for resolved video links in seconds.
    pub video_links_ttl_secs: u64,

    /// Interval between expired-entry sweeps in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            search_ttl_secs: 1800,
            detail_ttl_secs: 3600,
            video_links_ttl_secs: 7200,
            sweep_interval_secs: 300,
        }
    }
}

impl CacheConfig {
    /// TTL for a request's volatility class.
    pub fn ttl_for(&self, kind: RequestKind) -> Duration {
        let secs = match kind {
            RequestKind::Search => self.search_ttl_secs,
            RequestKind::Detail => self.detail_ttl_secs,
            RequestKind::VideoLinks => self.video_links_ttl_secs,
        };
        Duration::from_secs(secs)
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Sustained requests per second per client.
    pub requests_per_second: u32,

    /// Burst capacity.
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_second: 10,
            burst_size: 20,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,

    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Exporter bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount the admin routes.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}
