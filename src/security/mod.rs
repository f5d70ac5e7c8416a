//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming /api request:
//!     → rate_limit.rs (per-IP token bucket, 429 when empty)
//!     → handlers
//!
//! Incoming /admin request:
//!     → admin::auth (bearer API key, 401 otherwise)
//! ```

pub mod rate_limit;
