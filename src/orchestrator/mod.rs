//! Fetch orchestrator.
//!
//! # Data Flow
//! ```text
//! fetch(request)
//!     → validate → fingerprint → ResultCache hit? return
//!     → SingleFlight (one running fetch per fingerprint)
//!         → resolve URL → CircuitBreaker for the upstream host
//!         → RetryPolicy { TaskQueue::submit → worker → ResultProcessor }
//!         → breaker success/failure → ResultCache::set (TTL by kind)
//! ```
//!
//! The orchestrator owns every component. It is built once at startup and
//! cloned into whatever needs it (HTTP handlers, admin routes, tests).

pub mod fingerprint;
pub mod flight;
pub mod processor;
pub mod request;

use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::cache::ResultCache;
use crate::config::{ConfigError, ConfigHandle, OrchestratorConfig};
use crate::error::{FetchError, Result};
use crate::lifecycle::Shutdown;
use crate::observability::metrics::{MetricsSink, NoopMetrics};
use crate::proxy::{
    HttpProber, ProxyManager, ProxyMonitor, ProxyProber, ProxySource, ProxyStatus, RefreshReport,
    UserAgentRotator,
};
use crate::queue::TaskQueue;
use crate::resilience::{BreakerRegistry, BreakerSettings, BreakerSnapshot, CircuitState, RetryPolicy};
use crate::worker::{HttpSessionFactory, SessionFactory, WorkerPool, WorkerStatus};

pub use fingerprint::fingerprint;
pub use flight::SingleFlight;
pub use processor::{apply_rules, JsonProcessor, ResultProcessor};
pub use request::{upstream_key, FetchRequest, RequestKind};

/// Startup failures.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to open initial workers: {0}")]
    Pool(#[from] FetchError),
}

/// Outcome of [`FetchOrchestrator::rotate_proxies`].
#[derive(Debug, Clone, Serialize)]
pub struct RotateReport {
    pub refresh: RefreshReport,
    pub workers: usize,
}

/// Point-in-time counters for health and admin endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStats {
    pub pool_size: usize,
    pub busy_workers: usize,
    pub peak_busy_workers: usize,
    pub pending_tasks: usize,
    pub in_flight_tasks: usize,
    pub queue_capacity: usize,
    pub active_flights: usize,
    pub cache_entries: usize,
    pub proxies: usize,
    pub open_breakers: usize,
    pub uptime_secs: u64,
}

struct Inner {
    config: Arc<ConfigHandle>,
    proxies: Arc<ProxyManager>,
    prober: Arc<dyn ProxyProber>,
    pool: Arc<WorkerPool>,
    queue: TaskQueue,
    breakers: BreakerRegistry,
    cache: ResultCache,
    flights: SingleFlight,
    processor: Arc<dyn ResultProcessor>,
    metrics: Arc<dyn MetricsSink>,
    started_at: Instant,
}

/// Entry point for fetches and ops tooling. Cheap to clone.
#[derive(Clone)]
pub struct FetchOrchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for FetchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchOrchestrator")
            .field("pool", &self.inner.pool)
            .field("proxies", &self.inner.proxies)
            .field("breakers", &self.inner.breakers.len())
            .finish()
    }
}

impl FetchOrchestrator {
    pub fn builder(config: OrchestratorConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    /// Fetch, serving from cache when possible.
    pub async fn fetch(&self, request: FetchRequest) -> Result<Arc<Value>> {
        let started = Instant::now();
        let kind = request.kind;
        request.validate()?;

        let key = fingerprint(&request);
        if let Some(hit) = self.inner.cache.get(&key) {
            self.inner.metrics.cache_lookup(true);
            self.inner.metrics.fetch_completed(kind, "cache_hit", started.elapsed());
            tracing::debug!(fingerprint = %key, "Cache hit");
            return Ok(hit);
        }
        self.inner.metrics.cache_lookup(false);

        let inner = Arc::clone(&self.inner);
        let request = Arc::new(request);
        let flight_key = key.clone();
        let (outcome, joined) = self
            .inner
            .flights
            .run(&key, move || inner.fetch_uncached(request, flight_key).boxed())
            .await;

        if joined {
            self.inner.metrics.fetch_coalesced();
            tracing::debug!(fingerprint = %key, "Joined in-flight fetch");
        }
        let label = match &outcome {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        self.inner.metrics.fetch_completed(kind, label, started.elapsed());
        outcome
    }

    /// Resize the worker pool (clamped to the configured bounds).
    pub async fn scale_pool(&self, size: usize) -> Result<usize> {
        self.inner.pool.scale(size).await
    }

    /// Refresh proxy sources, then rebuild every worker on fresh bindings.
    pub async fn rotate_proxies(&self) -> Result<RotateReport> {
        let refresh = self.inner.proxies.refresh().await;
        let workers = self.inner.pool.rotate().await?;
        Ok(RotateReport { refresh, workers })
    }

    /// Breaker state for an upstream host, if one was ever created.
    pub fn breaker_state(&self, target: &str) -> Option<BreakerSnapshot> {
        self.inner.breakers.state(target)
    }

    pub fn breakers(&self) -> Vec<BreakerSnapshot> {
        self.inner.breakers.snapshots()
    }

    pub fn config(&self) -> Arc<OrchestratorConfig> {
        self.inner.config.load()
    }

    pub fn config_handle(&self) -> Arc<ConfigHandle> {
        Arc::clone(&self.inner.config)
    }

    /// Merge a partial config, validate, swap, and apply live settings.
    pub async fn update_config(&self, patch: Value) -> std::result::Result<Arc<OrchestratorConfig>, ConfigError> {
        let config = self.inner.config.update(patch)?;
        self.apply_config(&config).await;
        Ok(config)
    }

    /// Install a whole new config (file reloads).
    pub async fn replace_config(
        &self,
        config: OrchestratorConfig,
    ) -> std::result::Result<Arc<OrchestratorConfig>, ConfigError> {
        let config = self.inner.config.replace(config)?;
        self.apply_config(&config).await;
        Ok(config)
    }

    async fn apply_config(&self, config: &OrchestratorConfig) {
        self.inner.queue.resize(config.queue.max_concurrency);
        self.inner.breakers.apply_settings(BreakerSettings::from(&config.breaker));
        if let Err(e) = self.inner.pool.enforce_bounds().await {
            tracing::warn!(error = %e, "Failed to apply new pool bounds");
        }
    }

    pub fn clear_cache(&self) -> usize {
        let removed = self.inner.cache.clear();
        tracing::info!(removed, "Cache cleared");
        removed
    }

    pub fn proxies(&self) -> Vec<ProxyStatus> {
        self.inner.proxies.snapshot()
    }

    pub async fn workers(&self) -> Vec<WorkerStatus> {
        self.inner.pool.statuses().await
    }

    pub async fn stats(&self) -> OrchestratorStats {
        OrchestratorStats {
            pool_size: self.inner.pool.len().await,
            busy_workers: self.inner.pool.busy(),
            peak_busy_workers: self.inner.pool.peak_busy(),
            pending_tasks: self.inner.queue.pending(),
            in_flight_tasks: self.inner.queue.in_flight(),
            queue_capacity: self.inner.queue.max_concurrency(),
            active_flights: self.inner.flights.len(),
            cache_entries: self.inner.cache.len(),
            proxies: self.inner.proxies.len(),
            open_breakers: self
                .inner
                .breakers
                .snapshots()
                .iter()
                .filter(|b| b.state != CircuitState::Closed)
                .count(),
            uptime_secs: self.inner.started_at.elapsed().as_secs(),
        }
    }

    /// Start the proxy monitor, the cache sweeper and the autoscaler.
    pub fn spawn_maintenance(&self, shutdown: &Shutdown) -> Vec<JoinHandle<()>> {
        let config = self.inner.config.load();
        let mut tasks = Vec::new();

        if !self.inner.proxies.is_empty() || config.proxies.has_sources() {
            let monitor = ProxyMonitor::new(
                Arc::clone(&self.inner.proxies),
                Arc::clone(&self.inner.prober),
                Arc::clone(&self.inner.config),
                Arc::clone(&self.inner.metrics),
            );
            tasks.push(tokio::spawn(monitor.run(shutdown.subscribe())));
        }

        let sweep_every = Duration::from_secs(config.cache.sweep_interval_secs.max(1));
        tasks.push(tokio::spawn(
            self.inner.cache.clone().run_sweeper(sweep_every, shutdown.subscribe()),
        ));

        let autoscaler = self.clone();
        tasks.push(tokio::spawn(autoscaler.run_autoscaler(shutdown.subscribe())));

        tasks
    }

    /// Resize the pool toward the queue's demand until shutdown.
    async fn run_autoscaler(self, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        let every = Duration::from_secs(self.inner.config.load().pool.autoscale_interval_secs.max(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + every, every);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !self.inner.config.load().pool.autoscale {
                        continue;
                    }
                    let target = self.inner.pool.target_for_depth(self.inner.queue.pending());
                    if target != self.inner.pool.len().await {
                        if let Err(e) = self.inner.pool.scale(target).await {
                            tracing::warn!(target_size = target, error = %e, "Autoscale failed");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Autoscaler received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Retire every worker.
    pub async fn close(&self) {
        self.inner.pool.close().await;
    }
}

impl Inner {
    async fn fetch_uncached(self: Arc<Self>, request: Arc<FetchRequest>, key: String) -> Result<Arc<Value>> {
        // Another flight may have filled the cache since the caller looked.
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }

        let config = self.config.load();
        let url = request.resolve_url(&config.upstream)?;
        let upstream = upstream_key(&url);
        let breaker = self.breakers.get(&upstream);
        breaker.try_acquire()?;

        let policy = RetryPolicy::from_config(&config.retries);
        let url = url.to_string();
        let this = &*self;
        let outcome = policy
            .run(|attempt| {
                let request = Arc::clone(&request);
                let url = url.clone();
                async move {
                    let page = this.queue.submit(Arc::clone(&request), url, attempt).await?;
                    this.processor.process(&request, &page)
                }
            })
            .await;

        match outcome {
            Ok(value) => {
                breaker.record_success();
                let ttl = config.cache.ttl_for(request.kind);
                tracing::debug!(fingerprint = %key, ttl = ?ttl, "Caching result");
                Ok(self.cache.set(key, value, ttl))
            }
            Err(e) => {
                let last = e.last_error();
                match last {
                    FetchError::PoolExhausted(_) | FetchError::Shutdown => breaker.release_trial(),
                    FetchError::UpstreamStatus { status } if !last.is_retryable() => {
                        // The upstream answered; a 4xx says nothing about its health.
                        tracing::debug!(upstream = %upstream, status, "Upstream rejected request");
                        breaker.record_success();
                    }
                    _ => breaker.record_failure(),
                }
                tracing::warn!(upstream = %upstream, fingerprint = %key, error = %e, "Fetch failed");
                Err(e)
            }
        }
    }
}

/// Assembles a [`FetchOrchestrator`]. Every collaborator can be swapped,
/// which is how tests inject fake sessions and probers.
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    session_factory: Option<Arc<dyn SessionFactory>>,
    sources: Option<Vec<Arc<dyn ProxySource>>>,
    prober: Option<Arc<dyn ProxyProber>>,
    processor: Option<Arc<dyn ResultProcessor>>,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl OrchestratorBuilder {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            session_factory: None,
            sources: None,
            prober: None,
            processor: None,
            metrics: None,
        }
    }

    pub fn session_factory(mut self, factory: Arc<dyn SessionFactory>) -> Self {
        self.session_factory = Some(factory);
        self
    }

    pub fn proxy_sources(mut self, sources: Vec<Arc<dyn ProxySource>>) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn prober(mut self, prober: Arc<dyn ProxyProber>) -> Self {
        self.prober = Some(prober);
        self
    }

    pub fn processor(mut self, processor: Arc<dyn ResultProcessor>) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validate config, load proxies, open the initial workers and start
    /// the dispatcher. The dispatcher stops on `shutdown`.
    pub async fn build(self, shutdown: &Shutdown) -> std::result::Result<FetchOrchestrator, StartupError> {
        let initial_size = self.config.pool.initial_size;
        let config = Arc::new(ConfigHandle::new(self.config)?);
        let snapshot = config.load();
        let metrics = self.metrics.unwrap_or_else(|| Arc::new(NoopMetrics));

        let proxies = Arc::new(match self.sources {
            Some(sources) => ProxyManager::new(sources, UserAgentRotator::new(&snapshot.proxies.user_agents)),
            None => ProxyManager::from_config(&snapshot.proxies),
        });
        proxies.refresh().await;
        if proxies.is_empty() {
            tracing::warn!("No proxies available, workers will connect directly");
        }

        let prober = self.prober.unwrap_or_else(|| {
            Arc::new(HttpProber::new(
                snapshot.proxies.health_check_target.clone(),
                Duration::from_secs(snapshot.proxies.health_check_timeout_secs),
            ))
        });
        let factory = self
            .session_factory
            .unwrap_or_else(|| Arc::new(HttpSessionFactory::new(Arc::clone(&config))));
        let processor = self
            .processor
            .unwrap_or_else(|| Arc::new(JsonProcessor::new(Arc::clone(&config))));

        let pool = Arc::new(WorkerPool::new(
            Arc::clone(&proxies),
            factory,
            Arc::clone(&config),
            Arc::clone(&metrics),
        ));
        pool.init(initial_size).await?;

        let (queue, _dispatcher) = TaskQueue::start(Arc::clone(&pool), Arc::clone(&config), shutdown.subscribe());
        let breakers = BreakerRegistry::new(BreakerSettings::from(&snapshot.breaker), Arc::clone(&metrics));

        tracing::info!(
            workers = initial_size,
            proxies = proxies.len(),
            max_concurrency = snapshot.queue.max_concurrency,
            "Orchestrator ready"
        );

        Ok(FetchOrchestrator {
            inner: Arc::new(Inner {
                config,
                proxies,
                prober,
                pool,
                queue,
                breakers,
                cache: ResultCache::new(),
                flights: SingleFlight::new(),
                processor,
                metrics,
                started_at: Instant::now(),
            }),
        })
    }
}
