//! Concurrent fetch/scrape orchestration.
//!
//! A pool of workers, each bound to a rotating proxy and user agent, runs
//! fetches handed out by a bounded FIFO queue. The [`FetchOrchestrator`]
//! fronts it all: cache lookup, request coalescing, per-upstream circuit
//! breaking, retries with backoff, result post-processing and caching.

pub mod admin;
pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod orchestrator;
pub mod proxy;
pub mod queue;
pub mod resilience;
pub mod security;
pub mod worker;

pub use config::OrchestratorConfig;
pub use error::{FetchError, Result};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use orchestrator::{FetchOrchestrator, FetchRequest, RequestKind};
