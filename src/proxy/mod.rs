//! Proxy subsystem.
//!
//! # Data Flow
//! ```text
//! ProxySource (static list, HTTP lists)
//!     → ProxyManager::refresh (merge + dedupe, fail soft)
//!     → ProxyManager::next_binding (round-robin proxy + user agent)
//!     → WorkerPool (one binding per worker)
//!
//! ProxyMonitor (background):
//!     refresh timer → refresh()
//!     health timer  → check_health() → ProxyEntry::mark
//! ```

pub mod entry;
pub mod health;
pub mod manager;
pub mod source;
pub mod user_agent;

pub use entry::{parse_address, ProxyEntry, ProxyHealth, ProxyStatus};
pub use health::{HttpProber, ProxyMonitor, ProxyProber};
pub use manager::{HealthReport, ProxyBinding, ProxyManager, RefreshReport};
pub use source::{parse_proxy_list, HttpProxySource, ProxySource, StaticProxySource};
pub use user_agent::UserAgentRotator;
