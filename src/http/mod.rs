//! HTTP boundary.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (request ID, trace, timeout layers)
//!     → rate limit (security::rate_limit) → handlers.rs
//!     → FetchOrchestrator::fetch
//!     → JSON body, or error.rs (status code + Retry-After)
//! ```

pub mod error;
pub mod handlers;
pub mod server;

pub use error::ApiError;
pub use server::{AppState, HttpServer, X_REQUEST_ID};
