//! TTL result cache keyed by request fingerprint.
//!
//! Expiry is passive: a read past the deadline is a miss and drops the
//! entry. The optional sweeper only reclaims memory for keys nobody reads
//! again.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// Stand-in deadline for TTLs too large to add to the clock.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Arc<Value>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Shared result cache. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct ResultCache {
    entries: Arc<DashMap<String, CacheEntry>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unexpired value for `key`.
    pub fn get(&self, key: &str) -> Option<Arc<Value>> {
        let now = Instant::now();
        {
            let entry = self.entries.get(key)?;
            if !entry.is_expired(now) {
                return Some(Arc::clone(&entry.value));
            }
        }
        // Re-check under the write lock: a concurrent `set` may have refreshed it.
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        None
    }

    /// Store `value` for `ttl`, replacing any previous entry.
    pub fn set(&self, key: impl Into<String>, value: Value, ttl: Duration) -> Arc<Value> {
        let value = Arc::new(value);
        let now = Instant::now();
        let expires_at = now.checked_add(ttl).unwrap_or_else(|| now + FAR_FUTURE);
        self.entries.insert(
            key.into(),
            CacheEntry {
                value: Arc::clone(&value),
                expires_at,
            },
        );
        value
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every entry. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Entries held, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove expired entries. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Sweep every `every` until shutdown.
    pub async fn run_sweeper(self, every: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.sweep();
                    if removed > 0 {
                        tracing::debug!(removed, remaining = self.len(), "Swept expired cache entries");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Cache sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
