//! Retry policy for transient store failures.
//!
//! A reservation transaction is either committed whole or rolled back whole,
//! so after a transient failure the entire unit of work can simply run
//! again. This module decides how often and how far apart.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{RegistrationError, StoreError};

/// An error that knows whether running the failed work again may succeed.
pub trait Retryable {
    /// Whether a retry may succeed.
    fn is_retryable(&self) -> bool;
}

impl Retryable for RegistrationError {
    fn is_retryable(&self) -> bool {
        Self::is_retryable(self)
    }
}

impl Retryable for StoreError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }
}

/// How many times to run a unit of work and how long to wait in between.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero behaves like one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Growth factor applied per further attempt.
    pub backoff_multiplier: f64,
    /// Spread delays by +/-20% so that waiters released by the same commit
    /// do not retry in lockstep.
    pub use_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            use_jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Runs the work exactly once.
    pub const fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            use_jitter: false,
        }
    }

    /// The default policy with a different attempt budget.
    #[must_use]
    pub fn with_max_attempts(self, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..self
        }
    }

    /// Delay to wait before `attempt` (zero-based; attempt 0 never waits).
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let factor = self.backoff_multiplier.powi(exponent);
        let raw = self.base_delay.as_secs_f64() * factor;
        let capped = Duration::try_from_secs_f64(raw)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay));

        if self.use_jitter {
            jitter(capped)
        } else {
            capped
        }
    }

    /// Runs `work` until it succeeds, fails with a non-retryable error, or
    /// the attempt budget is spent. The last error is returned unchanged.
    pub async fn run<T, E, F, Fut>(&self, operation: &'static str, mut work: F) -> Result<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            if attempt > 0 {
                tokio::time::sleep(self.delay_before(attempt)).await;
            }

            match work().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(operation, attempt = attempt + 1, "[retry.succeeded]");
                    }
                    return Ok(value);
                }
                Err(error) if error.is_retryable() && attempt + 1 < attempts => {
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        error = %error,
                        "[retry.transient_failure] retrying"
                    );
                    attempt += 1;
                }
                Err(error) => {
                    if error.is_retryable() {
                        warn!(
                            operation,
                            attempts,
                            error = %error,
                            "[retry.exhausted]"
                        );
                    }
                    return Err(error);
                }
            }
        }
    }
}

fn jitter(delay: Duration) -> Duration {
    let factor = rand::rng().random_range(0.8..1.2);
    delay.mul_f64(factor)
}
