//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Build orchestrator → Spawn maintenance → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → dispatcher, monitors and server stop
//!     → queued tasks fail with Shutdown → workers closed
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
