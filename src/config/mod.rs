//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → runtime.rs ConfigHandle (validated, shared via Arc)
//!
//! On change:
//!     watcher.rs detects file change   |  admin PATCH /admin/config
//!     → loader.rs loads new config     |  → JSON merge over current
//!     → validation.rs validates
//!     → atomic swap inside ConfigHandle
//!     → orchestrator re-applies queue, breaker and pool limits
//! ```
//!
//! All fields have defaults to allow minimal configs.

pub mod loader;
pub mod runtime;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use runtime::ConfigHandle;
pub use schema::{
    AdminConfig, BreakerConfig, CacheConfig, ListenerConfig, ObservabilityConfig,
    OrchestratorConfig, PoolConfig, ProcessingRules, ProxyConfig, QueueConfig, RateLimitConfig,
    RetryConfig, TimeoutConfig, UpstreamConfig,
};
pub use validation::ValidationError;
pub use watcher::ConfigWatcher;
