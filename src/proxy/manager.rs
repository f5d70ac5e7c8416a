//! Proxy rotation.
//!
//! # Responsibilities
//! - Merge addresses from every source into one deduplicated set
//! - Hand out non-dead proxies in round-robin order
//! - Probe proxies and record their health
//!
//! The proxy set is swapped atomically on refresh. `next_proxy` reads a
//! snapshot, so it never blocks on a refresh or a health sweep.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use futures_util::future::join_all;
use serde::Serialize;

use crate::config::ProxyConfig;
use crate::proxy::entry::{ProxyEntry, ProxyHealth, ProxyStatus};
use crate::proxy::health::ProxyProber;
use crate::proxy::source::{HttpProxySource, ProxySource, StaticProxySource};
use crate::proxy::user_agent::UserAgentRotator;

/// A proxy and user agent pair handed to a new worker.
#[derive(Debug, Clone)]
pub struct ProxyBinding {
    /// `None` when no proxies are configured; the worker connects directly.
    pub proxy: Option<Arc<ProxyEntry>>,
    pub user_agent: Arc<str>,
}

impl ProxyBinding {
    pub fn direct(user_agent: impl Into<Arc<str>>) -> Self {
        Self {
            proxy: None,
            user_agent: user_agent.into(),
        }
    }

    pub fn proxy_address(&self) -> Option<&str> {
        self.proxy.as_deref().map(ProxyEntry::address)
    }
}

/// Outcome of [`ProxyManager::refresh`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshReport {
    pub added: usize,
    pub total: usize,
    pub failed_sources: Vec<String>,
}

/// Outcome of [`ProxyManager::check_health`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub healthy: usize,
    pub dead: usize,
}

pub struct ProxyManager {
    entries: ArcSwap<Vec<Arc<ProxyEntry>>>,
    cursor: AtomicUsize,
    user_agents: UserAgentRotator,
    sources: Vec<Arc<dyn ProxySource>>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for ProxyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyManager")
            .field("proxies", &self.len())
            .field("sources", &self.sources.len())
            .finish()
    }
}

impl ProxyManager {
    pub fn new(sources: Vec<Arc<dyn ProxySource>>, user_agents: UserAgentRotator) -> Self {
        Self {
            entries: ArcSwap::from_pointee(Vec::new()),
            cursor: AtomicUsize::new(0),
            user_agents,
            sources,
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Build the configured sources: static proxies first, then each URL.
    pub fn from_config(config: &ProxyConfig) -> Self {
        let mut sources: Vec<Arc<dyn ProxySource>> = Vec::new();
        if !config.static_proxies.is_empty() {
            sources.push(Arc::new(StaticProxySource::new(&config.static_proxies)));
        }
        let timeout = Duration::from_secs(config.health_check_timeout_secs.max(1) * 2);
        for url in &config.sources {
            sources.push(Arc::new(HttpProxySource::new(url.clone(), timeout)));
        }
        Self::new(sources, UserAgentRotator::new(&config.user_agents))
    }

    /// Pull every source and merge new addresses into the set.
    ///
    /// A failing source is logged and skipped. Existing entries keep their
    /// health state.
    pub async fn refresh(&self) -> RefreshReport {
        let _guard = self.refresh_lock.lock().await;

        let results = join_all(self.sources.iter().map(|source| async move {
            (source.name().to_string(), source.fetch().await)
        }))
        .await;

        let current = self.entries.load_full();
        let mut seen: HashSet<String> = current.iter().map(|e| e.address().to_string()).collect();
        let mut merged: Vec<Arc<ProxyEntry>> = current.iter().cloned().collect();
        let mut report = RefreshReport::default();

        for (name, result) in results {
            match result {
                Ok(addresses) => {
                    for address in addresses {
                        if seen.insert(address.clone()) {
                            merged.push(Arc::new(ProxyEntry::new(address)));
                            report.added += 1;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(source = %name, error = %e, "Proxy source refresh failed");
                    report.failed_sources.push(name);
                }
            }
        }

        report.total = merged.len();
        if report.added > 0 {
            self.entries.store(Arc::new(merged));
        }
        tracing::info!(
            added = report.added,
            total = report.total,
            failed = report.failed_sources.len(),
            "Proxy pool refreshed"
        );
        report
    }

    /// Next non-dead proxy in round-robin order.
    ///
    /// When every proxy is dead the first entry is returned anyway and the
    /// caller has to tolerate failures. `None` only when the set is empty.
    pub fn next_proxy(&self) -> Option<Arc<ProxyEntry>> {
        let snapshot = self.entries.load();
        let len = snapshot.len();
        if len == 0 {
            return None;
        }

        for _ in 0..len {
            let index = self.cursor.fetch_add(1, Ordering::Relaxed) % len;
            let entry = &snapshot[index];
            if !entry.is_dead() {
                return Some(Arc::clone(entry));
            }
        }

        tracing::warn!(proxies = len, "All proxies dead, using degraded fallback");
        Some(Arc::clone(&snapshot[0]))
    }

    /// Pair the next proxy with the next user agent.
    pub fn next_binding(&self) -> ProxyBinding {
        ProxyBinding {
            proxy: self.next_proxy(),
            user_agent: self.user_agents.next(),
        }
    }

    /// Probe every proxy concurrently and record the outcome.
    pub async fn check_health(&self, prober: &dyn ProxyProber, timeout: Duration) -> HealthReport {
        let snapshot = self.entries.load_full();

        let outcomes = join_all(snapshot.iter().map(|entry| async move {
            let alive = matches!(
                tokio::time::timeout(timeout, prober.probe(entry)).await,
                Ok(true)
            );
            if !alive {
                tracing::debug!(proxy = %entry.address(), "Proxy probe failed");
            }
            entry.mark(if alive { ProxyHealth::Healthy } else { ProxyHealth::Dead });
            alive
        }))
        .await;

        let healthy = outcomes.iter().filter(|alive| **alive).count();
        let report = HealthReport {
            healthy,
            dead: outcomes.len() - healthy,
        };
        tracing::info!(healthy = report.healthy, dead = report.dead, "Proxy health check complete");
        report
    }

    pub fn snapshot(&self) -> Vec<ProxyStatus> {
        self.entries.load().iter().map(|e| e.status()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, Result};
    use async_trait::async_trait;

    struct FixedSource(Vec<&'static str>);

    #[async_trait]
    impl ProxySource for FixedSource {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn fetch(&self) -> Result<Vec<String>> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl ProxySource for BrokenSource {
        fn name(&self) -> &str {
            "broken"
        }

        async fn fetch(&self) -> Result<Vec<String>> {
            Err(FetchError::ProxySource {
                source_name: "broken".into(),
                message: "connection refused".into(),
            })
        }
    }

    struct AliveIf(&'static str);

    #[async_trait]
    impl ProxyProber for AliveIf {
        async fn probe(&self, proxy: &ProxyEntry) -> bool {
            proxy.address() == self.0
        }
    }

    fn manager(sources: Vec<Arc<dyn ProxySource>>) -> ProxyManager {
        ProxyManager::new(sources, UserAgentRotator::default())
    }

    #[tokio::test]
    async fn test_refresh_merges_and_fails_soft() {
        let pm = manager(vec![
            Arc::new(FixedSource(vec!["a:1", "b:2"])),
            Arc::new(BrokenSource),
            Arc::new(FixedSource(vec!["b:2", "c:3"])),
        ]);

        let report = pm.refresh().await;
        assert_eq!(report.added, 3);
        assert_eq!(report.total, 3);
        assert_eq!(report.failed_sources, vec!["broken".to_string()]);

        let again = pm.refresh().await;
        assert_eq!(again.added, 0);
        assert_eq!(pm.len(), 3);
    }

    #[tokio::test]
    async fn test_round_robin_skips_dead() {
        let pm = manager(vec![Arc::new(FixedSource(vec!["a:1", "b:2", "c:3"]))]);
        pm.refresh().await;

        let report = pm.check_health(&AliveIf("b:2"), Duration::from_secs(1)).await;
        assert_eq!(report, HealthReport { healthy: 1, dead: 2 });

        for _ in 0..4 {
            assert_eq!(pm.next_proxy().unwrap().address(), "b:2");
        }
    }

    #[tokio::test]
    async fn test_round_robin_order() {
        let pm = manager(vec![Arc::new(FixedSource(vec!["a:1", "b:2", "c:3"]))]);
        pm.refresh().await;

        let picked: Vec<String> = (0..4)
            .map(|_| pm.next_proxy().unwrap().address().to_string())
            .collect();
        assert_eq!(picked, vec!["a:1", "b:2", "c:3", "a:1"]);
    }

    #[tokio::test]
    async fn test_all_dead_returns_first() {
        let pm = manager(vec![Arc::new(FixedSource(vec!["a:1", "b:2"]))]);
        pm.refresh().await;
        pm.check_health(&AliveIf("none"), Duration::from_secs(1)).await;

        assert_eq!(pm.next_proxy().unwrap().address(), "a:1");
        assert_eq!(pm.next_proxy().unwrap().address(), "a:1");
    }

    #[test]
    fn test_empty_manager_binds_direct() {
        let pm = manager(Vec::new());
        let binding = pm.next_binding();
        assert!(binding.proxy.is_none());
        assert!(!binding.user_agent.is_empty());
    }
}
