//! Bounded retries for transient connection failures.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::MigrateResult;

/// Configuration for retry behavior.
///
/// Only errors for which [`MigrationError::is_transient`] holds are
/// retried. A failed script is never retried.
///
/// [`MigrationError::is_transient`]: crate::MigrationError::is_transient
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Create the default policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that makes a single attempt.
    pub fn none() -> Self {
        Self {
            attempts: 1,
            delay: Duration::ZERO,
        }
    }

    /// Set the number of attempts.
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Set the delay between attempts.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Run `operation` until it succeeds, fails permanently or the attempts
    /// run out.
    pub async fn run<T, F, Fut>(&self, what: &str, mut operation: F) -> MigrateResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = MigrateResult<T>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < attempts => {
                    warn!(
                        attempt,
                        attempts,
                        delay_ms = self.delay.as_millis() as u64,
                        "{} failed: {}; retrying",
                        what,
                        err
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
