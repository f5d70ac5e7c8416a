//! Timeout enforcement.
//!
//! Every attempt runs under a deadline; an elapsed deadline becomes
//! [`FetchError::FetchTimeout`], distinct from every other failure so the
//! dispatcher can recycle the worker that hung.

use std::future::Future;
use std::time::Duration;

use crate::error::{FetchError, Result};

/// Run `fut` with a deadline.
pub async fn with_deadline<T, F>(deadline: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(outcome) => outcome,
        Err(_) => Err(FetchError::FetchTimeout(deadline)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_elapses() {
        let outcome: Result<()> = with_deadline(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        })
        .await;
        assert_eq!(outcome, Err(FetchError::FetchTimeout(Duration::from_millis(50))));
    }

    #[tokio::test]
    async fn test_inner_result_passes_through() {
        let outcome = with_deadline(Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(outcome, Ok(7));
    }
}
