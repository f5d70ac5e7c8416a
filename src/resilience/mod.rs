//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Fetch on cache miss:
//!     → circuit_breaker.rs (fail fast while the upstream circuit is open)
//!     → retries.rs (attempt loop, backoff.rs delays between attempts)
//!     → timeouts.rs (deadline around each attempt)
//!     → circuit_breaker.rs (record the fetch outcome)
//! ```

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use backoff::BackoffStrategy;
pub use circuit_breaker::{BreakerRegistry, BreakerSettings, BreakerSnapshot, CircuitBreaker, CircuitState};
pub use retries::RetryPolicy;
