//! Request coalescing.
//!
//! At most one fetch runs per fingerprint. Later callers for the same key
//! await the running one. The fetch is spawned, so a caller that gives up
//! does not cancel it for the others (or for the cache write).

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;

use crate::error::{FetchError, Result};

type SharedFetch = Shared<BoxFuture<'static, Result<Arc<Value>>>>;

/// Unregisters a flight when its task ends, however it ends.
struct FlightDone {
    in_flight: Arc<DashMap<String, SharedFetch>>,
    key: String,
}

impl Drop for FlightDone {
    fn drop(&mut self) {
        self.in_flight.remove(&self.key);
    }
}

#[derive(Default)]
pub struct SingleFlight {
    in_flight: Arc<DashMap<String, SharedFetch>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `start()` for `key` unless a fetch for it is already running.
    ///
    /// Returns the outcome and whether this caller joined an existing fetch.
    pub async fn run<F>(&self, key: &str, start: F) -> (Result<Arc<Value>>, bool)
    where
        F: FnOnce() -> BoxFuture<'static, Result<Arc<Value>>>,
    {
        let (fetch, joined) = match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(entry) => (entry.get().clone(), true),
            Entry::Vacant(entry) => {
                let work = start();
                let finished = FlightDone {
                    in_flight: Arc::clone(&self.in_flight),
                    key: key.to_string(),
                };
                let handle = tokio::spawn(async move {
                    // Dropped on completion and on panic alike.
                    let _finished = finished;
                    work.await
                });

                let shared = async move {
                    handle
                        .await
                        .unwrap_or_else(|e| Err(FetchError::Internal(format!("fetch task failed: {}", e))))
                }
                .boxed()
                .shared();
                entry.insert(shared.clone());
                (shared, false)
            }
        };

        (fetch.await, joined)
    }

    /// Fetches currently running.
    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }
}
