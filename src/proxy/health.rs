//! Proxy health probing and the background monitor.
//!
//! # Responsibilities
//! - Probe a proxy against a fixed reachability target
//! - Periodically refresh sources and re-check health
//! - Report healthy/dead counts to the metrics sink

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time::{self, Instant};

use crate::config::ConfigHandle;
use crate::observability::metrics::MetricsSink;
use crate::proxy::entry::ProxyEntry;
use crate::proxy::manager::ProxyManager;

/// Decides whether a proxy is usable.
#[async_trait]
pub trait ProxyProber: Send + Sync {
    async fn probe(&self, proxy: &ProxyEntry) -> bool;
}

/// Probes by fetching a target through the proxy.
#[derive(Debug, Clone)]
pub struct HttpProber {
    target: String,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(target: impl Into<String>, timeout: Duration) -> Self {
        Self {
            target: target.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ProxyProber for HttpProber {
    async fn probe(&self, proxy: &ProxyEntry) -> bool {
        let client = match reqwest::Proxy::all(proxy.url())
            .and_then(|p| reqwest::Client::builder().proxy(p).timeout(self.timeout).build())
        {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(proxy = %proxy.address(), error = %e, "Failed to build probe client");
                return false;
            }
        };

        match client.get(&self.target).send().await {
            Ok(response) => {
                let ok = response.status().is_success();
                if !ok {
                    tracing::debug!(proxy = %proxy.address(), status = %response.status(), "Probe returned non-success status");
                }
                ok
            }
            Err(e) => {
                tracing::debug!(proxy = %proxy.address(), error = %e, "Probe failed");
                false
            }
        }
    }
}

/// Runs refresh and health-check timers until shutdown.
pub struct ProxyMonitor {
    manager: Arc<ProxyManager>,
    prober: Arc<dyn ProxyProber>,
    config: Arc<ConfigHandle>,
    metrics: Arc<dyn MetricsSink>,
}

impl ProxyMonitor {
    pub fn new(
        manager: Arc<ProxyManager>,
        prober: Arc<dyn ProxyProber>,
        config: Arc<ConfigHandle>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            manager,
            prober,
            config,
            metrics,
        }
    }

    /// Run one health sweep and publish the counts.
    pub async fn check_now(&self) {
        let timeout = Duration::from_secs(self.config.load().proxies.health_check_timeout_secs);
        let report = self.manager.check_health(self.prober.as_ref(), timeout).await;
        self.metrics.proxy_health(report.healthy, report.dead);
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let config = self.config.load();
        let refresh_every = Duration::from_secs(config.proxies.refresh_interval_secs.max(1));
        let check_every = Duration::from_secs(config.proxies.health_check_interval_secs.max(1));

        tracing::info!(
            refresh = ?refresh_every,
            health_check = ?check_every,
            probe_target = %config.proxies.health_check_target,
            "Proxy monitor starting"
        );

        // The pool was refreshed during startup; the first ticks come one
        // period later.
        let mut refresh_ticker = time::interval_at(Instant::now() + refresh_every, refresh_every);
        let mut check_ticker = time::interval_at(Instant::now() + check_every, check_every);

        loop {
            tokio::select! {
                _ = refresh_ticker.tick() => {
                    self.manager.refresh().await;
                }
                _ = check_ticker.tick() => {
                    self.check_now().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Proxy monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrchestratorConfig;
    use crate::observability::NoopMetrics;
    use crate::proxy::entry::ProxyHealth;
    use crate::proxy::source::StaticProxySource;
    use crate::proxy::user_agent::UserAgentRotator;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Reports every proxy alive except `dead`, and counts sweeps.
    struct DeadOne {
        dead: &'static str,
        checks: AtomicUsize,
    }

    #[async_trait]
    impl ProxyProber for DeadOne {
        async fn probe(&self, proxy: &ProxyEntry) -> bool {
            self.checks.fetch_add(1, Ordering::SeqCst);
            proxy.address() != self.dead
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_check_takes_dead_proxy_out_of_rotation() {
        let manager = Arc::new(ProxyManager::new(
            vec![Arc::new(StaticProxySource::new(&[
                "10.0.0.1:8080".to_string(),
                "10.0.0.2:8080".to_string(),
                "10.0.0.3:8080".to_string(),
            ]))],
            UserAgentRotator::default(),
        ));
        manager.refresh().await;

        let mut config = OrchestratorConfig::default();
        config.proxies.health_check_interval_secs = 10;
        let prober = Arc::new(DeadOne {
            dead: "10.0.0.2:8080",
            checks: AtomicUsize::new(0),
        });
        let monitor = ProxyMonitor::new(
            Arc::clone(&manager),
            prober.clone(),
            Arc::new(ConfigHandle::new(config).unwrap()),
            Arc::new(NoopMetrics),
        );
        let (shutdown, rx) = broadcast::channel(1);
        let task = tokio::spawn(monitor.run(rx));

        // Nothing is checked before the first period elapses.
        time::sleep(Duration::from_secs(9)).await;
        assert_eq!(prober.checks.load(Ordering::SeqCst), 0);
        let picked: Vec<_> = (0..3).map(|_| manager.next_proxy().unwrap().address().to_string()).collect();
        assert!(picked.contains(&"10.0.0.2:8080".to_string()));

        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(prober.checks.load(Ordering::SeqCst), 3);
        let dead: Vec<_> = manager
            .snapshot()
            .into_iter()
            .filter(|s| s.health == ProxyHealth::Dead)
            .map(|s| s.address)
            .collect();
        assert_eq!(dead, vec!["10.0.0.2:8080".to_string()]);
        for _ in 0..6 {
            assert_ne!(manager.next_proxy().unwrap().address(), "10.0.0.2:8080");
        }

        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(prober.checks.load(Ordering::SeqCst), 6);

        shutdown.send(()).unwrap();
        task.await.unwrap();
    }
}
