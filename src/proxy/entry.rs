//! A single upstream proxy.
//!
//! Health lives in atomics so the monitor can update it while workers read
//! it without taking a lock.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// Proxy health.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyHealth {
    Unknown = 0,
    Healthy = 1,
    Dead = 2,
}

impl From<u8> for ProxyHealth {
    fn from(val: u8) -> Self {
        match val {
            1 => ProxyHealth::Healthy,
            2 => ProxyHealth::Dead,
            _ => ProxyHealth::Unknown,
        }
    }
}

/// Normalize a raw `host:port` (optionally `http://host:port`) entry.
///
/// Returns `None` for anything malformed: missing port, port 0, empty host
/// or embedded whitespace.
pub fn parse_address(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let without_scheme = trimmed
        .strip_prefix("http://")
        .unwrap_or(trimmed)
        .trim_end_matches('/');

    let (host, port) = without_scheme.rsplit_once(':')?;
    if host.is_empty() || host.contains(char::is_whitespace) || host.contains('/') {
        return None;
    }
    let port: u16 = port.parse().ok()?;
    if port == 0 {
        return None;
    }

    Some(format!("{}:{}", host.to_ascii_lowercase(), port))
}

/// An upstream proxy with its last observed health.
#[derive(Debug)]
pub struct ProxyEntry {
    address: String,
    health: AtomicU8,
    /// Unix millis of the last health check; 0 = never checked.
    last_checked_ms: AtomicU64,
}

impl ProxyEntry {
    /// Create an entry for an already normalized address.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            health: AtomicU8::new(ProxyHealth::Unknown as u8),
            last_checked_ms: AtomicU64::new(0),
        }
    }

    /// Parse and normalize a raw entry.
    pub fn parse(raw: &str) -> Option<Self> {
        parse_address(raw).map(Self::new)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Proxy URL suitable for `reqwest::Proxy::all`.
    pub fn url(&self) -> String {
        format!("http://{}", self.address)
    }

    pub fn health(&self) -> ProxyHealth {
        ProxyHealth::from(self.health.load(Ordering::Relaxed))
    }

    pub fn is_dead(&self) -> bool {
        self.health() == ProxyHealth::Dead
    }

    /// Record the outcome of a health check.
    pub fn mark(&self, health: ProxyHealth) {
        self.health.store(health as u8, Ordering::Relaxed);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        self.last_checked_ms.store(now.max(1), Ordering::Relaxed);
    }

    pub fn last_checked(&self) -> Option<SystemTime> {
        match self.last_checked_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(UNIX_EPOCH + Duration::from_millis(ms)),
        }
    }

    pub fn status(&self) -> ProxyStatus {
        ProxyStatus {
            address: self.address.clone(),
            health: self.health(),
            last_checked_ms: match self.last_checked_ms.load(Ordering::Relaxed) {
                0 => None,
                ms => Some(ms),
            },
        }
    }
}

/// Serializable view of a proxy.
#[derive(Debug, Clone, Serialize)]
pub struct ProxyStatus {
    pub address: String,
    pub health: ProxyHealth,
    pub last_checked_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("10.0.0.1:8080").as_deref(), Some("10.0.0.1:8080"));
        assert_eq!(parse_address(" http://Proxy.Example:3128/ ").as_deref(), Some("proxy.example:3128"));
        assert_eq!(parse_address("10.0.0.1"), None);
        assert_eq!(parse_address(":8080"), None);
        assert_eq!(parse_address("10.0.0.1:0"), None);
        assert_eq!(parse_address("10.0.0.1:99999"), None);
        assert_eq!(parse_address("bad host:80"), None);
    }

    #[test]
    fn test_mark_updates_health_and_timestamp() {
        let entry = ProxyEntry::parse("10.0.0.1:8080").unwrap();
        assert_eq!(entry.health(), ProxyHealth::Unknown);
        assert!(entry.last_checked().is_none());

        entry.mark(ProxyHealth::Dead);
        assert!(entry.is_dead());
        assert!(entry.last_checked().is_some());
        assert_eq!(entry.url(), "http://10.0.0.1:8080");
    }
}
