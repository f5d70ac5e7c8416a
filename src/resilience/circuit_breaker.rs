//! Circuit breaker for upstream protection.
//!
//! # States
//! - Closed: normal operation, fetches pass through
//! - Open: upstream assumed down, fetches fail fast
//! - Half-Open: one trial fetch decides the next state
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= max_failures
//! Open → Half-Open: cooldown elapsed since the last failure (next call is the trial)
//! Half-Open → Closed: trial succeeds (failure count reset)
//! Half-Open → Open: trial fails (last failure refreshed)
//! ```
//!
//! One breaker per upstream target, created lazily by [`BreakerRegistry`]
//! and never removed.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::BreakerConfig;
use crate::error::{FetchError, Result};
use crate::observability::metrics::MetricsSink;

/// Wait suggested to callers turned away while a trial is running.
const TRIAL_BUSY_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Thresholds for a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSettings {
    pub max_failures: u32,
    pub cooldown: Duration,
}

impl From<&BreakerConfig> for BreakerSettings {
    fn from(config: &BreakerConfig) -> Self {
        Self {
            max_failures: config.max_failures.max(1),
            cooldown: Duration::from_secs(config.cooldown_secs),
        }
    }
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self::from(&BreakerConfig::default())
    }
}

/// Point-in-time view of a breaker, for ops tooling.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub target: String,
    pub state: CircuitState,
    pub failures: u32,
    /// Milliseconds since the last recorded failure.
    pub last_failure_ms_ago: Option<u64>,
    /// Milliseconds until an open circuit admits its trial call.
    pub retry_after_ms: Option<u64>,
}

#[derive(Debug)]
struct BreakerInner {
    settings: BreakerSettings,
    state: CircuitState,
    failures: u32,
    last_failure: Option<Instant>,
    trial_in_flight: bool,
}

/// Single-target circuit breaker.
pub struct CircuitBreaker {
    target: String,
    inner: Mutex<BreakerInner>,
    metrics: Arc<dyn MetricsSink>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("target", &self.target)
            .field("inner", &self.inner)
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(target: impl Into<String>, settings: BreakerSettings, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            target: target.into(),
            inner: Mutex::new(BreakerInner {
                settings,
                state: CircuitState::Closed,
                failures: 0,
                last_failure: None,
                trial_in_flight: false,
            }),
            metrics,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Current state. Reading never transitions the breaker.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Ask permission to execute.
    ///
    /// Fails with [`FetchError::UpstreamUnavailable`] while open, or while a
    /// half-open trial is already running.
    pub fn try_acquire(&self) -> Result<()> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed >= inner.settings.cooldown {
                    inner.trial_in_flight = true;
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    Ok(())
                } else {
                    Err(self.unavailable(inner.settings.cooldown - elapsed))
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    Err(self.unavailable(TRIAL_BUSY_RETRY_AFTER))
                } else {
                    inner.trial_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    /// Record a successful execution.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.failures = 0;
        inner.trial_in_flight = false;
        if inner.state == CircuitState::HalfOpen {
            self.transition(&mut inner, CircuitState::Closed);
        }
    }

    /// Record a failed execution.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.last_failure = Some(Instant::now());
        inner.trial_in_flight = false;
        match inner.state {
            CircuitState::Closed => {
                inner.failures = inner.failures.saturating_add(1);
                if inner.failures >= inner.settings.max_failures {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                inner.failures = inner.failures.saturating_add(1);
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    /// Give back a half-open trial that ended without a verdict on the
    /// upstream (e.g. the queue was full), so the next call can try again.
    pub fn release_trial(&self) {
        self.lock().trial_in_flight = false;
    }

    /// Apply new thresholds. The current state is kept.
    pub fn apply_settings(&self, settings: BreakerSettings) {
        self.lock().settings = settings;
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        let since = inner.last_failure.map(|at| at.elapsed());
        let retry_after = match (inner.state, since) {
            (CircuitState::Open, Some(since)) => {
                Some(inner.settings.cooldown.saturating_sub(since).as_millis() as u64)
            }
            _ => None,
        };
        BreakerSnapshot {
            target: self.target.clone(),
            state: inner.state,
            failures: inner.failures,
            last_failure_ms_ago: since.map(|d| d.as_millis() as u64),
            retry_after_ms: retry_after,
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        if to == CircuitState::Closed {
            inner.failures = 0;
        }

        match to {
            CircuitState::Open => tracing::warn!(
                upstream = %self.target,
                from = from.as_str(),
                failures = inner.failures,
                cooldown = ?inner.settings.cooldown,
                "Circuit opened"
            ),
            _ => tracing::info!(
                upstream = %self.target,
                from = from.as_str(),
                to = to.as_str(),
                "Circuit state changed"
            ),
        }
        self.metrics.breaker_transition(&self.target, from, to);
    }

    fn unavailable(&self, retry_after: Duration) -> FetchError {
        FetchError::UpstreamUnavailable {
            target: self.target.clone(),
            retry_after,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().expect("circuit breaker mutex poisoned")
    }
}

/// Lazily created breakers keyed by upstream target.
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    settings: Mutex<BreakerSettings>,
    metrics: Arc<dyn MetricsSink>,
}

impl BreakerRegistry {
    pub fn new(settings: BreakerSettings, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            breakers: DashMap::new(),
            settings: Mutex::new(settings),
            metrics,
        }
    }

    /// Breaker for `target`, created on first use.
    pub fn get(&self, target: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(target) {
            return Arc::clone(existing.value());
        }
        let settings = *self.settings.lock().expect("breaker settings mutex poisoned");
        self.breakers
            .entry(target.to_string())
            .or_insert_with(|| {
                tracing::debug!(upstream = %target, "Creating circuit breaker");
                Arc::new(CircuitBreaker::new(target, settings, Arc::clone(&self.metrics)))
            })
            .value()
            .clone()
    }

    /// Snapshot of an existing breaker. Unknown targets have no breaker yet.
    pub fn state(&self, target: &str) -> Option<BreakerSnapshot> {
        self.breakers.get(target).map(|b| b.snapshot())
    }

    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut all: Vec<_> = self.breakers.iter().map(|b| b.snapshot()).collect();
        all.sort_by(|a, b| a.target.cmp(&b.target));
        all
    }

    /// Push new thresholds to every existing and future breaker.
    pub fn apply_settings(&self, settings: BreakerSettings) {
        *self.settings.lock().expect("breaker settings mutex poisoned") = settings;
        for breaker in self.breakers.iter() {
            breaker.apply_settings(settings);
        }
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
