//! Backoff delays with optional jitter.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// `attempt * base`.
    #[default]
    Linear,
    /// `base * 2^(attempt - 1)`.
    Exponential,
}

/// Delay to wait after failed attempt number `attempt` (1-based).
///
/// The delay is capped at `max_ms`, then up to `jitter * delay` of random
/// extra time is added. Attempt 0 never waits.
pub fn calculate_backoff(
    strategy: BackoffStrategy,
    attempt: u32,
    base_ms: u64,
    max_ms: u64,
    jitter: f64,
) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let delay_ms = match strategy {
        BackoffStrategy::Linear => base_ms.saturating_mul(u64::from(attempt)),
        BackoffStrategy::Exponential => {
            base_ms.saturating_mul(2u64.saturating_pow(attempt - 1))
        }
    };
    let capped_delay = delay_ms.min(max_ms);

    let jitter_range = (capped_delay as f64 * jitter.clamp(0.0, 1.0)) as u64;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..=jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_backoff() {
        let b1 = calculate_backoff(BackoffStrategy::Linear, 1, 1000, 30_000, 0.0);
        assert_eq!(b1, Duration::from_millis(1000));

        let b2 = calculate_backoff(BackoffStrategy::Linear, 2, 1000, 30_000, 0.0);
        assert_eq!(b2, Duration::from_millis(2000));

        let b3 = calculate_backoff(BackoffStrategy::Linear, 3, 1000, 30_000, 0.0);
        assert_eq!(b3, Duration::from_millis(3000));
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let b3 = calculate_backoff(BackoffStrategy::Exponential, 3, 100, 2000, 0.0);
        assert_eq!(b3, Duration::from_millis(400));

        let max = calculate_backoff(BackoffStrategy::Exponential, 10, 100, 1000, 0.0);
        assert_eq!(max, Duration::from_millis(1000));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        for _ in 0..50 {
            let d = calculate_backoff(BackoffStrategy::Linear, 2, 100, 10_000, 0.5);
            assert!(d >= Duration::from_millis(200));
            assert!(d <= Duration::from_millis(300));
        }
    }

    #[test]
    fn test_zeroth_attempt_has_no_delay() {
        assert_eq!(
            calculate_backoff(BackoffStrategy::Linear, 0, 1000, 30_000, 0.5),
            Duration::ZERO
        );
    }
}
