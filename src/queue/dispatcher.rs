//! Dispatch loop.
//!
//! Takes tasks in FIFO order, waits for an idle worker, and runs each task
//! on its own tokio task. A task's worker is released before its reply is
//! sent, so a waiting task can claim it right away.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::config::ConfigHandle;
use crate::error::{FetchError, Result};
use crate::queue::task::Task;
use crate::queue::QueueInner;
use crate::resilience::timeouts::with_deadline;
use crate::worker::{RawPage, WorkerGuard, WorkerPool};

pub(crate) struct Dispatcher {
    pub(crate) rx: mpsc::UnboundedReceiver<Task>,
    pub(crate) pool: Arc<WorkerPool>,
    pub(crate) config: Arc<ConfigHandle>,
    pub(crate) queue: Arc<QueueInner>,
}

impl Dispatcher {
    pub(crate) async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!("Dispatcher starting");

        loop {
            let task = tokio::select! {
                task = self.rx.recv() => match task {
                    Some(task) => task,
                    None => break,
                },
                _ = shutdown.recv() => break,
            };

            let worker = tokio::select! {
                worker = self.pool.acquire() => worker,
                _ = shutdown.recv() => {
                    self.queue.pending.fetch_sub(1, Ordering::SeqCst);
                    let _ = task.reply.send(Err(FetchError::Shutdown));
                    break;
                }
            };

            self.queue.pending.fetch_sub(1, Ordering::SeqCst);
            self.queue.in_flight.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(
                worker = %worker.id(),
                attempt = task.attempt,
                waited = ?task.enqueued_at.elapsed(),
                "Dispatching task"
            );

            let deadline = task
                .request
                .timeout()
                .unwrap_or_else(|| self.config.load().timeouts.attempt());
            tokio::spawn(execute(
                task,
                worker,
                Arc::clone(&self.pool),
                Arc::clone(&self.queue),
                deadline,
            ));
        }

        self.queue.capacity.close();
        self.rx.close();
        while let Ok(task) = self.rx.try_recv() {
            self.queue.pending.fetch_sub(1, Ordering::SeqCst);
            let _ = task.reply.send(Err(FetchError::Shutdown));
        }
        tracing::info!("Dispatcher stopped");
    }
}

async fn execute(
    task: Task,
    worker: WorkerGuard,
    pool: Arc<WorkerPool>,
    queue: Arc<QueueInner>,
    deadline: std::time::Duration,
) {
    let Task {
        url,
        attempt,
        reply,
        permit,
        ..
    } = task;

    let outcome: Result<RawPage> = with_deadline(deadline, worker.session().fetch(&url)).await;
    worker.record_completed();

    if let Err(FetchError::FetchTimeout(_)) = &outcome {
        tracing::warn!(worker = %worker.id(), attempt, url = %url, "Attempt timed out, recycling worker");
        pool.recycle(worker).await;
    } else {
        drop(worker);
    }

    queue.in_flight.fetch_sub(1, Ordering::SeqCst);
    queue.release(permit);
    let _ = reply.send(outcome);
}
