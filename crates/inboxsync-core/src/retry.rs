//! Bounded retry with a caller-supplied delay schedule.
//!
//! The schedule is deterministic: no jitter, no randomization. Attempt `n`
//! (1-based) that fails waits `delays[n - 1]` before attempt `n + 1`, reusing
//! the last delay if the list is shorter than the number of retries.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use futures_util::TryFutureExt;
use tracing::warn;

use crate::config::RetryConfig;

/// Retry policy: how many attempts, and how long to wait between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delays: Vec<Duration>,
}

impl RetryPolicy {
    /// Create a policy. `max_attempts` counts the first attempt; zero is treated as one.
    pub fn new(max_attempts: u32, delays: Vec<Duration>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delays,
        }
    }

    /// Build a policy from configuration.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            config
                .delays_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
        )
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self::new(1, Vec::new())
    }

    /// Total attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait after failed attempt `attempt` (1-based), or `None` if it was the last.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts {
            return None;
        }
        let index = (attempt - 1) as usize;
        Some(
            self.delays
                .get(index)
                .or_else(|| self.delays.last())
                .copied()
                .unwrap_or(Duration::ZERO),
        )
    }

    fn schedule(&self) -> DelaySchedule<'_> {
        DelaySchedule {
            policy: self,
            failed_attempts: 0,
        }
    }

    /// Run `operation` until it succeeds or the attempts are exhausted.
    ///
    /// Returns the first success, or the error of the final attempt.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let max_attempts = self.max_attempts;
        let mut attempt = 0u32;

        backoff::future::retry_notify(
            self.schedule(),
            move || operation().map_err(backoff::Error::transient),
            move |err: E, delay: Duration| {
                attempt += 1;
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "attempt failed, retrying"
                );
            },
        )
        .await
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// [`Backoff`] adapter that walks a policy's delay list once.
struct DelaySchedule<'a> {
    policy: &'a RetryPolicy,
    failed_attempts: u32,
}

impl Backoff for DelaySchedule<'_> {
    fn reset(&mut self) {
        self.failed_attempts = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        self.failed_attempts += 1;
        self.policy.delay_after(self.failed_attempts)
    }
}
