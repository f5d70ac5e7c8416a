//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events (logging.rs installs the subscriber)
//!     → MetricsSink hooks (metrics.rs; Prometheus or no-op)
//!
//! Consumers:
//!     → stdout (JSON or human-readable)
//!     → Prometheus scrape endpoint (optional)
//! ```

pub mod logging;
pub mod metrics;

pub use self::logging::init_logging;
pub use self::metrics::{init_metrics, MetricsSink, NoopMetrics, PrometheusMetrics};
