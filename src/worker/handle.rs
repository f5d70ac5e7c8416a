//! Worker handles and the guard that marks one busy.

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

use crate::proxy::ProxyBinding;
use crate::worker::fetcher::Session;

/// State shared between the pool and outstanding guards.
#[derive(Debug, Default)]
pub(crate) struct PoolShared {
    /// Signalled whenever a worker may have become idle.
    pub(crate) idle: Notify,
    pub(crate) busy: AtomicUsize,
    pub(crate) peak_busy: AtomicUsize,
}

/// One execution context bound to a proxy and user agent.
pub struct WorkerHandle {
    id: Uuid,
    seq: u64,
    binding: ProxyBinding,
    session: Arc<dyn Session>,
    busy: AtomicBool,
    /// Set once the worker leaves the pool; a retired worker is never claimed.
    retired: AtomicBool,
    closed: AtomicBool,
    created_at: Instant,
    completed: AtomicU64,
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("id", &self.id)
            .field("seq", &self.seq)
            .field("proxy", &self.binding.proxy_address())
            .field("busy", &self.is_busy())
            .field("retired", &self.is_retired())
            .finish()
    }
}

impl WorkerHandle {
    pub(crate) fn new(seq: u64, binding: ProxyBinding, session: Arc<dyn Session>) -> Self {
        Self {
            id: Uuid::new_v4(),
            seq,
            binding,
            session,
            busy: AtomicBool::new(false),
            retired: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            created_at: Instant::now(),
            completed: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Creation order within the pool; higher is newer.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn binding(&self) -> &ProxyBinding {
        &self.binding
    }

    pub fn session(&self) -> &dyn Session {
        self.session.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Flip idle to busy. Fails if already busy or retired.
    pub(crate) fn try_claim(&self) -> bool {
        if self.is_retired() {
            return false;
        }
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Take the worker out of service. Idle workers close right away; busy
    /// ones close when their guard drops.
    pub(crate) fn retire(self: &Arc<Self>) {
        self.retired.store(true, Ordering::SeqCst);
        if !self.is_busy() {
            self.close_in_background();
        }
    }

    pub(crate) fn close_in_background(self: &Arc<Self>) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let handle = Arc::clone(self);
        tokio::spawn(async move {
            handle.session.close().await;
            tracing::debug!(worker = %handle.id, "Worker session closed");
        });
    }

    pub fn status(&self) -> WorkerStatus {
        WorkerStatus {
            id: self.id,
            seq: self.seq,
            proxy: self.binding.proxy_address().map(str::to_string),
            user_agent: self.binding.user_agent.to_string(),
            busy: self.is_busy(),
            completed: self.completed.load(Ordering::Relaxed),
            age_secs: self.created_at.elapsed().as_secs(),
        }
    }
}

/// Serializable view of a worker.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub id: Uuid,
    pub seq: u64,
    pub proxy: Option<String>,
    pub user_agent: String,
    pub busy: bool,
    pub completed: u64,
    pub age_secs: u64,
}

/// Exclusive use of a worker. Dropping it returns the worker to idle.
#[derive(Debug)]
pub struct WorkerGuard {
    handle: Arc<WorkerHandle>,
    shared: Arc<PoolShared>,
}

impl WorkerGuard {
    /// Must only be called after a successful `try_claim`.
    pub(crate) fn new(handle: Arc<WorkerHandle>, shared: Arc<PoolShared>) -> Self {
        let busy = shared.busy.fetch_add(1, Ordering::SeqCst) + 1;
        shared.peak_busy.fetch_max(busy, Ordering::SeqCst);
        Self { handle, shared }
    }

    pub(crate) fn handle(&self) -> &Arc<WorkerHandle> {
        &self.handle
    }
}

impl Deref for WorkerGuard {
    type Target = WorkerHandle;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.handle.busy.store(false, Ordering::SeqCst);
        self.shared.busy.fetch_sub(1, Ordering::SeqCst);
        if self.handle.is_retired() {
            self.handle.close_in_background();
        } else {
            self.shared.idle.notify_one();
        }
    }
}
