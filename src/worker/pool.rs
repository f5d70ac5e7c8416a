//! Elastic worker pool.
//!
//! # Responsibilities
//! - Create workers bound to a proxy and user agent
//! - Grow or shrink toward a target size within `[min_size, max_size]`
//! - Rotate every worker onto fresh proxy bindings
//! - Hand out idle workers, chosen at random, one task per worker
//!
//! # Locking
//! The handle list sits behind an async `RwLock`. Scale, rotate and recycle
//! take it exclusively while they resize; acquisition takes it shared just
//! long enough to claim an idle handle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::ConfigHandle;
use crate::error::Result;
use crate::observability::metrics::MetricsSink;
use crate::proxy::ProxyManager;
use crate::worker::fetcher::SessionFactory;
use crate::worker::handle::{PoolShared, WorkerGuard, WorkerHandle, WorkerStatus};

pub struct WorkerPool {
    handles: RwLock<Vec<Arc<WorkerHandle>>>,
    shared: Arc<PoolShared>,
    next_seq: AtomicU64,
    proxies: Arc<ProxyManager>,
    factory: Arc<dyn SessionFactory>,
    config: Arc<ConfigHandle>,
    metrics: Arc<dyn MetricsSink>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("busy", &self.busy())
            .field("peak_busy", &self.peak_busy())
            .finish()
    }
}

impl WorkerPool {
    /// Create an empty pool. Call [`WorkerPool::init`] before use.
    pub fn new(
        proxies: Arc<ProxyManager>,
        factory: Arc<dyn SessionFactory>,
        config: Arc<ConfigHandle>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            handles: RwLock::new(Vec::new()),
            shared: Arc::new(PoolShared::default()),
            next_seq: AtomicU64::new(0),
            proxies,
            factory,
            config,
            metrics,
        }
    }

    /// Replace the pool with `size` fresh workers (clamped to the bounds).
    pub async fn init(&self, size: usize) -> Result<usize> {
        let size = self.config.load().pool.clamp(size);
        let fresh = self.open_workers(size).await?;

        let mut handles = self.handles.write().await;
        let old = std::mem::replace(&mut *handles, fresh);
        for handle in &old {
            handle.retire();
        }
        drop(handles);

        self.shared.idle.notify_waiters();
        self.metrics.pool_resized(size);
        tracing::info!(size, "Worker pool initialized");
        Ok(size)
    }

    /// Grow or shrink toward `target`, clamped to `[min_size, max_size]`.
    ///
    /// Shrinking retires the newest workers first. Busy workers leave the
    /// pool immediately and close once their task finishes. Returns the new
    /// size.
    pub async fn scale(&self, target: usize) -> Result<usize> {
        let target = self.config.load().pool.clamp(target);
        let mut handles = self.handles.write().await;
        let current = handles.len();

        if target > current {
            let mut grown = 0;
            let mut failure = None;
            for _ in current..target {
                match self.open_worker().await {
                    Ok(handle) => {
                        handles.push(handle);
                        grown += 1;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to open worker while scaling up");
                        failure = Some(e);
                        break;
                    }
                }
            }
            let size = handles.len();
            drop(handles);

            if grown > 0 {
                self.shared.idle.notify_waiters();
                self.metrics.pool_resized(size);
                tracing::info!(from = current, to = size, "Worker pool scaled up");
            }
            return match failure {
                Some(e) if grown == 0 => Err(e),
                _ => Ok(size),
            };
        }

        if target < current {
            // Handles are kept in creation order, so the tail is the newest.
            let excess = handles.split_off(target);
            for handle in excess.iter().rev() {
                tracing::debug!(worker = %handle.id(), seq = handle.seq(), busy = handle.is_busy(), "Retiring worker");
                handle.retire();
            }
            drop(handles);

            self.metrics.pool_resized(target);
            tracing::info!(from = current, to = target, "Worker pool scaled down");
        }

        Ok(target)
    }

    /// Re-clamp the current size after the bounds changed.
    pub async fn enforce_bounds(&self) -> Result<usize> {
        let current = self.len().await;
        self.scale(current).await
    }

    /// Size the autoscaler should aim for given the queue depth.
    pub fn target_for_depth(&self, pending: usize) -> usize {
        self.config.load().pool.clamp(self.busy() + pending)
    }

    /// Tear down every worker and recreate the same number with fresh
    /// proxy bindings.
    pub async fn rotate(&self) -> Result<usize> {
        let size = self.config.load().pool.clamp(self.len().await);
        let fresh = self.open_workers(size).await?;

        let mut handles = self.handles.write().await;
        let old = std::mem::replace(&mut *handles, fresh);
        drop(handles);

        for handle in &old {
            handle.retire();
        }
        self.shared.idle.notify_waiters();
        self.metrics.pool_resized(size);
        tracing::info!(retired = old.len(), size, "Worker pool rotated");
        Ok(size)
    }

    /// Wait until an idle worker is available and claim it.
    pub async fn acquire(&self) -> WorkerGuard {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(guard) = self.try_acquire().await {
                return guard;
            }
            notified.await;
        }
    }

    /// Claim a random idle worker, if any.
    pub async fn try_acquire(&self) -> Option<WorkerGuard> {
        let handles = self.handles.read().await;
        let len = handles.len();
        if len == 0 {
            return None;
        }

        let start = fastrand::usize(..len);
        for offset in 0..len {
            let handle = &handles[(start + offset) % len];
            if handle.try_claim() {
                return Some(WorkerGuard::new(Arc::clone(handle), Arc::clone(&self.shared)));
            }
        }
        None
    }

    /// Close a worker presumed hung and replace it with a fresh one.
    pub async fn recycle(&self, guard: WorkerGuard) {
        let id = guard.id();
        guard.handle().retire();
        self.metrics.worker_recycled();

        let mut handles = self.handles.write().await;
        let Some(position) = handles.iter().position(|h| h.id() == id) else {
            // Already scaled away or rotated out.
            return;
        };
        handles.remove(position);

        match self.open_worker().await {
            Ok(replacement) => {
                tracing::warn!(worker = %id, replacement = %replacement.id(), "Recycled hung worker");
                handles.push(replacement);
                drop(handles);
                self.shared.idle.notify_waiters();
            }
            Err(e) => {
                tracing::warn!(worker = %id, error = %e, "Recycled hung worker without replacement");
            }
        }
        drop(guard);
    }

    /// Retire every worker. Used on shutdown.
    pub async fn close(&self) {
        let mut handles = self.handles.write().await;
        for handle in handles.drain(..) {
            handle.retire();
        }
        tracing::info!("Worker pool closed");
    }

    pub async fn len(&self) -> usize {
        self.handles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Workers currently executing a task.
    pub fn busy(&self) -> usize {
        self.shared.busy.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously busy workers seen so far.
    pub fn peak_busy(&self) -> usize {
        self.shared.peak_busy.load(Ordering::SeqCst)
    }

    pub async fn statuses(&self) -> Vec<WorkerStatus> {
        self.handles.read().await.iter().map(|h| h.status()).collect()
    }

    async fn open_workers(&self, count: usize) -> Result<Vec<Arc<WorkerHandle>>> {
        let mut fresh = Vec::with_capacity(count);
        for _ in 0..count {
            match self.open_worker().await {
                Ok(handle) => fresh.push(handle),
                Err(e) => {
                    for handle in &fresh {
                        handle.retire();
                    }
                    return Err(e);
                }
            }
        }
        Ok(fresh)
    }

    async fn open_worker(&self) -> Result<Arc<WorkerHandle>> {
        let binding = self.proxies.next_binding();
        let session = self.factory.open(&binding).await?;
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let handle = Arc::new(WorkerHandle::new(seq, binding, session));
        tracing::debug!(
            worker = %handle.id(),
            seq,
            proxy = handle.binding().proxy_address().unwrap_or("direct"),
            "Worker opened"
        );
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrchestratorConfig;
    use crate::error::FetchError;
    use crate::observability::NoopMetrics;
    use crate::proxy::{ProxyBinding, UserAgentRotator};
    use crate::worker::fetcher::{RawPage, Session};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct NullSession {
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Session for NullSession {
        async fn fetch(&self, url: &str) -> crate::error::Result<RawPage> {
            Ok(RawPage {
                url: url.to_string(),
                status: 200,
                body: "{}".into(),
            })
        }

        async fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct NullFactory {
        opened: AtomicUsize,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SessionFactory for NullFactory {
        async fn open(&self, _binding: &ProxyBinding) -> crate::error::Result<Arc<dyn Session>> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(NullSession {
                closed: Arc::clone(&self.closed),
            }))
        }
    }

    struct FailingFactory;

    #[async_trait]
    impl SessionFactory for FailingFactory {
        async fn open(&self, _binding: &ProxyBinding) -> crate::error::Result<Arc<dyn Session>> {
            Err(FetchError::Internal("no browser".into()))
        }
    }

    fn pool_with(factory: Arc<dyn SessionFactory>, min: usize, max: usize) -> WorkerPool {
        let mut config = OrchestratorConfig::default();
        config.pool.min_size = min;
        config.pool.initial_size = min;
        config.pool.max_size = max;
        WorkerPool::new(
            Arc::new(ProxyManager::new(Vec::new(), UserAgentRotator::default())),
            factory,
            Arc::new(ConfigHandle::new(config).unwrap()),
            Arc::new(NoopMetrics),
        )
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_scale_respects_floor_and_ceiling() {
        let pool = pool_with(Arc::new(NullFactory::default()), 2, 5);
        pool.init(3).await.unwrap();

        assert_eq!(pool.scale(100).await.unwrap(), 5);
        assert_eq!(pool.len().await, 5);
        assert_eq!(pool.scale(0).await.unwrap(), 2);
        assert_eq!(pool.len().await, 2);
    }

    #[tokio::test]
    async fn test_shrink_retires_newest_first() {
        let factory = Arc::new(NullFactory::default());
        let pool = pool_with(factory.clone(), 1, 5);
        pool.init(4).await.unwrap();

        let before: Vec<u64> = pool.statuses().await.iter().map(|s| s.seq).collect();
        pool.scale(2).await.unwrap();
        let after: Vec<u64> = pool.statuses().await.iter().map(|s| s.seq).collect();

        assert_eq!(after, before[..2].to_vec());
        settle().await;
        assert_eq!(factory.closed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_busy_worker_closes_after_release() {
        let factory = Arc::new(NullFactory::default());
        let pool = pool_with(factory.clone(), 1, 2);
        pool.init(2).await.unwrap();

        let a = pool.try_acquire().await.unwrap();
        let b = pool.try_acquire().await.unwrap();
        assert!(pool.try_acquire().await.is_none());
        assert_eq!(pool.busy(), 2);

        pool.scale(1).await.unwrap();
        settle().await;
        assert_eq!(factory.closed.load(Ordering::SeqCst), 0);

        drop(a);
        drop(b);
        settle().await;
        assert_eq!(factory.closed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.busy(), 0);
        assert_eq!(pool.peak_busy(), 2);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let pool = Arc::new(pool_with(Arc::new(NullFactory::default()), 1, 1));
        pool.init(1).await.unwrap();

        let held = pool.acquire().await;
        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire().await.id() })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        let id = held.id();
        drop(held);
        assert_eq!(waiter.await.unwrap(), id);
    }

    #[tokio::test]
    async fn test_rotate_replaces_every_worker() {
        let factory = Arc::new(NullFactory::default());
        let pool = pool_with(factory.clone(), 1, 5);
        pool.init(3).await.unwrap();

        let before: Vec<_> = pool.statuses().await.iter().map(|s| s.id).collect();
        assert_eq!(pool.rotate().await.unwrap(), 3);
        let after: Vec<_> = pool.statuses().await.iter().map(|s| s.id).collect();

        assert!(before.iter().all(|id| !after.contains(id)));
        assert_eq!(factory.opened.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_recycle_swaps_in_replacement() {
        let factory = Arc::new(NullFactory::default());
        let pool = pool_with(factory.clone(), 1, 2);
        pool.init(2).await.unwrap();

        let guard = pool.try_acquire().await.unwrap();
        let hung = guard.id();
        pool.recycle(guard).await;
        settle().await;

        let ids: Vec<_> = pool.statuses().await.iter().map(|s| s.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(!ids.contains(&hung));
        assert_eq!(factory.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_target_for_depth_is_clamped() {
        let pool = pool_with(Arc::new(NullFactory::default()), 2, 6);
        pool.init(2).await.unwrap();

        assert_eq!(pool.target_for_depth(0), 2);
        assert_eq!(pool.target_for_depth(4), 4);
        assert_eq!(pool.target_for_depth(50), 6);
    }

    #[tokio::test]
    async fn test_init_failure_propagates() {
        let pool = pool_with(Arc::new(FailingFactory), 1, 2);
        assert!(matches!(pool.init(1).await, Err(FetchError::Internal(_))));
    }
}
