//! Retry Policy
//!
//! Linear backoff shared by the query executor and by direct store calls
//! made from the repository and session manager.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{DataError, Result};

// == Retry Policy ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Treated as at least 1.
    pub attempts: u32,
    /// Wait before retry `n` is `base_delay * n`
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts,
            base_delay,
        }
    }

    /// One attempt, no retries.
    pub const fn single() -> Self {
        Self {
            attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.attempts.max(1)
    }

    /// Backoff after the given (1-based) failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Runs `op`, retrying transient failures.
    ///
    /// With a single attempt the error is returned unchanged. Otherwise an
    /// exhausted budget yields `DataError::Database` wrapping the last error.
    /// Non-transient errors are returned immediately.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max = self.max_attempts();
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if max == 1 || !e.is_transient() => return Err(e),
                Err(e) if attempt >= max => {
                    return Err(DataError::Database {
                        attempts: attempt,
                        source: Box::new(e),
                    })
                }
                Err(e) => {
                    warn!("{} failed (attempt {}/{}): {}", label, attempt, max, e);
                    tokio::time::sleep(self.delay_for(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::single()
    }
}

impl DataError {
    /// Failures worth retrying: store, cache and timeout errors.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DataError::Store(_) | DataError::Cache(_) | DataError::Timeout(_)
        )
    }
}
