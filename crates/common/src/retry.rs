//! Exponential-backoff retry for network calls.
//!
//! One policy applies to every upstream call: a handful of attempts with
//! doubling delays, retrying only failures that stand a chance of clearing
//! on their own (transport errors, 5xx, 429).

use std::future::Future;
use std::time::Duration;

use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::RetryIf;

use crate::error::FetchError;

/// Retry schedule for upstream requests.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: usize,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Multiplier applied to the delay after each retry.
    pub factor: u64,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay: Duration::from_millis(1000),
            factor: 2,
            max_delay: Duration::from_millis(10_000),
        }
    }
}

impl RetryPolicy {
    /// Run `op`, retrying per this policy while the error is retryable.
    ///
    /// The delays form a geometric series: `initial_delay * factor^n`,
    /// capped at `max_delay`.
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        // ExponentialBackoff yields factor^n; scale it so the first delay
        // comes out at initial_delay.
        let scale = (self.initial_delay.as_millis() as u64 / self.factor).max(1);
        let strategy = ExponentialBackoff::from_millis(self.factor)
            .factor(scale)
            .max_delay(self.max_delay)
            .take(self.attempts.saturating_sub(1));

        RetryIf::spawn(strategy, op, |err: &FetchError| err.is_retryable()).await
    }
}
