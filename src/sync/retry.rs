//! Linear backoff for target-store calls.
//!
//! Only errors classified retryable by
//! [`StoreError::is_retryable`](crate::store::StoreError::is_retryable) are
//! retried; everything else surfaces on the first failure. The wait before
//! retry `n` is `base_delay × n`.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::store::StoreResult;

/// Retry budget for one logical call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    /// Run `op` until it succeeds, fails permanently, or the budget runs out.
    ///
    /// # Errors
    ///
    /// Returns the last error from `op`.
    pub async fn run<F, Fut, T>(&self, label: &str, mut op: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!("{label} succeeded after {attempt} retries");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    attempt += 1;
                    if !err.is_retryable() || attempt > self.max_retries {
                        return Err(err);
                    }
                    let wait = self.delay_for(attempt);
                    warn!(
                        "{label} failed ({err}), retry {attempt}/{} in {wait:?}",
                        self.max_retries
                    );
                    sleep(wait).await;
                }
            }
        }
    }
}
