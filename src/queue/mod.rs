//! Bounded task queue with backpressure.
//!
//! # Data Flow
//! ```text
//! enqueue(): wait for a capacity permit (optionally with a deadline)
//!     → Task pushed to the FIFO channel
//!     → Dispatcher: wait for an idle worker → execute → release worker
//!     → reply to the waiting caller → permit returned
//! ```
//!
//! Capacity counts tasks that are queued or executing. When it is used up,
//! `enqueue` blocks until a task completes.

pub mod dispatcher;
pub mod task;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::ConfigHandle;
use crate::error::{FetchError, Result};
use crate::orchestrator::FetchRequest;
use crate::queue::dispatcher::Dispatcher;
use crate::worker::{RawPage, WorkerPool};

pub use task::Task;

#[derive(Debug)]
pub(crate) struct QueueInner {
    pub(crate) capacity: Arc<Semaphore>,
    max: AtomicUsize,
    tx: mpsc::UnboundedSender<Task>,
    /// Tasks waiting for a worker.
    pub(crate) pending: AtomicUsize,
    /// Tasks running on a worker.
    pub(crate) in_flight: AtomicUsize,
    /// Permits still to be retired after a shrink; paid off as tasks finish.
    shrink_debt: AtomicUsize,
    config: Arc<ConfigHandle>,
}

impl QueueInner {
    /// Return a finished task's capacity, or retire it if a shrink is owed.
    pub(crate) fn release(&self, permit: OwnedSemaphorePermit) {
        let owed = self
            .shrink_debt
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |debt| debt.checked_sub(1))
            .is_ok();
        if owed {
            permit.forget();
        } else {
            drop(permit);
        }
    }
}

/// Handle to the queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    inner: Arc<QueueInner>,
}

impl TaskQueue {
    /// Create the queue and spawn its dispatcher.
    pub fn start(
        pool: Arc<WorkerPool>,
        config: Arc<ConfigHandle>,
        shutdown: broadcast::Receiver<()>,
    ) -> (Self, JoinHandle<()>) {
        let max = config.load().queue.max_concurrency;
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(QueueInner {
            capacity: Arc::new(Semaphore::new(max)),
            max: AtomicUsize::new(max),
            tx,
            pending: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            shrink_debt: AtomicUsize::new(0),
            config: Arc::clone(&config),
        });

        let dispatcher = Dispatcher {
            rx,
            pool,
            config,
            queue: Arc::clone(&inner),
        };
        let handle = tokio::spawn(dispatcher.run(shutdown));

        (Self { inner }, handle)
    }

    /// Admit a task, waiting for capacity if the queue is full.
    ///
    /// With `queue.enqueue_timeout_ms` set, a wait longer than that fails
    /// with [`FetchError::PoolExhausted`].
    pub async fn enqueue(
        &self,
        request: Arc<FetchRequest>,
        url: String,
        attempt: u32,
    ) -> Result<oneshot::Receiver<Result<RawPage>>> {
        let acquire = Arc::clone(&self.inner.capacity).acquire_owned();
        let permit = match self.inner.config.load().queue.enqueue_timeout_ms {
            Some(ms) => {
                let wait = Duration::from_millis(ms);
                match tokio::time::timeout(wait, acquire).await {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::warn!(waited = ?wait, "Task queue full");
                        return Err(FetchError::PoolExhausted(wait));
                    }
                }
            }
            None => acquire.await,
        }
        .map_err(|_| FetchError::Shutdown)?;

        let (reply, rx) = oneshot::channel();
        let task = Task {
            request,
            url,
            enqueued_at: Instant::now(),
            attempt,
            reply,
            permit,
        };

        self.inner.pending.fetch_add(1, Ordering::SeqCst);
        if self.inner.tx.send(task).is_err() {
            self.inner.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(FetchError::Shutdown);
        }
        Ok(rx)
    }

    /// Enqueue and wait for the worker's answer.
    pub async fn submit(&self, request: Arc<FetchRequest>, url: String, attempt: u32) -> Result<RawPage> {
        let rx = self.enqueue(request, url, attempt).await?;
        rx.await.map_err(|_| FetchError::Shutdown)?
    }

    /// Change the capacity.
    ///
    /// Shrinking retires idle capacity at once; the rest is retired as
    /// running tasks finish, without holding up new enqueues.
    pub fn resize(&self, max: usize) {
        let max = max.max(1);
        let previous = self.inner.max.swap(max, Ordering::SeqCst);
        if max > previous {
            let grow = max - previous;
            let owed = self
                .inner
                .shrink_debt
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |debt| Some(debt.saturating_sub(grow)))
                .unwrap_or(0);
            self.inner.capacity.add_permits(grow - owed.min(grow));
        } else if max < previous {
            let excess = previous - max;
            let retired = self.inner.capacity.forget_permits(excess);
            self.inner.shrink_debt.fetch_add(excess - retired, Ordering::SeqCst);
        }
        if max != previous {
            tracing::info!(from = previous, to = max, "Task queue resized");
        }
    }

    /// Tasks waiting for a worker.
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Tasks currently executing.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_concurrency(&self) -> usize {
        self.inner.max.load(Ordering::SeqCst)
    }

    /// Capacity left before `enqueue` blocks.
    pub fn available(&self) -> usize {
        self.inner.capacity.available_permits()
    }
}
