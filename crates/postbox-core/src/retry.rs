//! Retry policy and the in-process retrier.

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

/// How hard the [`Retrier`] tries before giving up.
///
/// Attempt budget: `1 + immediate_retries + retries_with_backoff`.
/// - the first attempt and `immediate_retries` follow-ups run back-to-back;
/// - each of the `retries_with_backoff` attempts is preceded by a sleep that
///   starts at `initial_delay` and is multiplied by `backoff_factor` after
///   every attempt.
///
/// Example with `with_backoff(3, 100ms, 2.0)`: sleeps of 100ms, 200ms, 400ms.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub immediate_retries: u32,
    pub retries_with_backoff: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
}

impl RetryPolicy {
    /// Exactly one attempt.
    pub fn no_retries() -> Self {
        Self {
            immediate_retries: 0,
            retries_with_backoff: 0,
            initial_delay: Duration::ZERO,
            backoff_factor: 1.0,
        }
    }

    pub fn with_immediate_retries(mut self, retries: u32) -> Self {
        self.immediate_retries = retries;
        self
    }

    pub fn with_backoff(mut self, retries: u32, initial_delay: Duration, backoff_factor: f64) -> Self {
        self.retries_with_backoff = retries;
        self.initial_delay = initial_delay;
        self.backoff_factor = backoff_factor;
        self
    }

    pub fn total_attempts(&self) -> u32 {
        1 + self.immediate_retries + self.retries_with_backoff
    }

    /// Sleep before the `n`-th backoff attempt (0-indexed).
    pub fn backoff_delay(&self, n: u32) -> Duration {
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(n as i32);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::no_retries()
    }
}

/// Runs an operation under a [`RetryPolicy`].
///
/// Stateless apart from the policy, so one retrier can serve many rows
/// concurrently.
#[derive(Debug, Clone, Default)]
pub struct Retrier {
    policy: RetryPolicy,
}

impl Retrier {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` until it succeeds or the attempt budget is spent.
    ///
    /// On exhaustion the last error is returned, wrapped with this
    /// operation's tag.
    pub async fn retry<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        for attempt in 0..self.policy.immediate_retries {
            tracing::debug!(attempt = attempt + 1, error = %last, "retrying immediately");
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => last = err,
            }
        }

        for n in 0..self.policy.retries_with_backoff {
            let delay = self.policy.backoff_delay(n);
            tracing::debug!(?delay, error = %last, "retrying after backoff");
            tokio::time::sleep(delay).await;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => last = err,
            }
        }

        Err(Error::op("retry.Retrier.retry").wrap(last))
    }
}
