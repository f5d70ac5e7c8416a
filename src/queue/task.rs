//! Queued fetch tasks.

use std::sync::Arc;

use tokio::sync::{oneshot, OwnedSemaphorePermit};
use tokio::time::Instant;

use crate::error::Result;
use crate::orchestrator::FetchRequest;
use crate::worker::RawPage;

/// A request waiting for (or running on) a worker.
///
/// Holds one unit of queue capacity until it completes.
#[derive(Debug)]
pub struct Task {
    pub request: Arc<FetchRequest>,
    /// Resolved upstream URL.
    pub url: String,
    pub enqueued_at: Instant,
    /// 1-based attempt number within the retry loop.
    pub attempt: u32,
    pub(crate) reply: oneshot::Sender<Result<RawPage>>,
    pub(crate) permit: OwnedSemaphorePermit,
}
