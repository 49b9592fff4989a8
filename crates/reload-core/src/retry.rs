use std::{fmt, future::Future, time::Duration};

use tokio::time::{Instant, sleep};
use tracing::{error, info};

/// Bounded exponential backoff.
///
/// Retries stop at whichever limit is reached first: `max_attempts` calls,
/// or a next sleep that would push total elapsed time past `max_elapsed_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base_delay_ms: u64,
    max_delay_ms: u64,
    multiplier: u32,
    max_attempts: u32,
    max_elapsed_ms: u64,
}

impl RetryPolicy {
    pub fn new(base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            multiplier: 2,
            max_attempts: 10,
            max_elapsed_ms: 10_000,
        }
    }

    pub fn with_multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = multiplier.max(1);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_max_elapsed_ms(mut self, max_elapsed_ms: u64) -> Self {
        self.max_elapsed_ms = max_elapsed_ms;
        self
    }

    pub fn base_delay_ms(&self) -> u64 {
        self.base_delay_ms
    }

    pub fn max_delay_ms(&self) -> u64 {
        self.max_delay_ms
    }

    pub fn multiplier(&self) -> u32 {
        self.multiplier
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn max_elapsed(&self) -> Duration {
        Duration::from_millis(self.max_elapsed_ms)
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.multiplier)
            .checked_pow(attempt)
            .unwrap_or(u64::MAX);
        let bounded = self
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(bounded)
    }

    /// Run `op` until it succeeds or the policy is exhausted.
    ///
    /// `op` receives the zero-based attempt number. On exhaustion the error
    /// from the last attempt is returned.
    pub async fn retry<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            let err = match op(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        info!(label, attempts = attempt + 1, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            let next_attempt = attempt.saturating_add(1);
            if next_attempt >= self.max_attempts {
                error!(label, attempts = next_attempt, error = %err, "retry attempts exhausted");
                return Err(err);
            }

            let delay = self.delay_for_attempt(attempt);
            if started.elapsed() + delay > self.max_elapsed() {
                error!(
                    label,
                    attempts = next_attempt,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %err,
                    "retry time budget exhausted"
                );
                return Err(err);
            }

            info!(
                label,
                attempt = next_attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "attempt failed, backing off"
            );
            sleep(delay).await;
            attempt = next_attempt;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(100, 5_000)
    }
}
