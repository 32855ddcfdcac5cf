//! Fixed-delay polling.

use std::future::Future;
use std::time::Duration;

/// How often and how long to poll for a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Polling used while waiting for workloads to (not) be ready.
    pub const fn readiness() -> Self {
        Self::new(300, Duration::from_secs(1))
    }

    /// Evaluate `check` until it yields `true` or attempts run out.
    ///
    /// Returns whether the condition was met. Errors from `check` end the
    /// polling immediately.
    pub async fn poll<F, Fut, E>(&self, mut check: F) -> Result<bool, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, E>>,
    {
        for attempt in 1..=self.max_attempts {
            if check().await? {
                return Ok(true);
            }
            if attempt < self.max_attempts && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }
        Ok(false)
    }
}
