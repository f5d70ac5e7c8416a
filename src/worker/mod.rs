//! Worker subsystem.
//!
//! # Data Flow
//! ```text
//! ProxyManager::next_binding
//!     → SessionFactory::open (fetcher.rs)
//!     → WorkerHandle (handle.rs)
//!     → WorkerPool (pool.rs): acquire → WorkerGuard → release on drop
//! ```

pub mod fetcher;
pub mod handle;
pub mod pool;

pub use fetcher::{HttpSessionFactory, RawPage, Session, SessionFactory};
pub use handle::{WorkerGuard, WorkerHandle, WorkerStatus};
pub use pool::WorkerPool;
