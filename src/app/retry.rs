//! Deadline-bounded retry policy for patch downloads
//!
//! A [`RetryPolicy`] bundles the three parts of the retry contract: a
//! wall-clock budget shared by all attempts of one request, a predicate that
//! decides which failures are worth another attempt, and a randomized
//! exponential backoff between attempts. It runs any async operation, so the
//! contract can be tested without network I/O.

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use serde::{Deserialize, Serialize};

use crate::constants::retry;
use crate::errors::{PatchError, PatchResult};

/// Decides whether a failed attempt may be retried
pub type RetryPredicate = fn(&PatchError) -> bool;

/// Retry policy: deadline, retryable-condition predicate and backoff curve
#[derive(Clone)]
pub struct RetryPolicy {
    /// Total wall-clock budget across all attempts
    pub deadline: Duration,
    /// First backoff delay
    pub initial_interval: Duration,
    /// Upper bound for a single delay
    pub max_interval: Duration,
    /// Growth factor between delays
    pub multiplier: f64,
    /// Relative jitter applied to each delay
    pub randomization_factor: f64,
    /// Which failures are retried; everything else propagates immediately
    pub retryable: RetryPredicate,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            deadline: retry::DEADLINE,
            initial_interval: retry::INITIAL_INTERVAL,
            max_interval: retry::MAX_INTERVAL,
            multiplier: retry::MULTIPLIER,
            randomization_factor: retry::RANDOMIZATION_FACTOR,
            retryable: PatchError::is_rate_limited,
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("deadline", &self.deadline)
            .field("initial_interval", &self.initial_interval)
            .field("max_interval", &self.max_interval)
            .field("multiplier", &self.multiplier)
            .field("randomization_factor", &self.randomization_factor)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    /// Default policy with a different deadline
    pub fn with_deadline(deadline: Duration) -> Self {
        Self {
            deadline,
            ..Default::default()
        }
    }

    /// Backoff curve for one request; the deadline is enforced by `run`
    fn backoff(&self) -> ExponentialBackoff {
        let mut backoff = ExponentialBackoff {
            current_interval: self.initial_interval,
            initial_interval: self.initial_interval,
            randomization_factor: self.randomization_factor,
            multiplier: self.multiplier,
            max_interval: self.max_interval,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };
        backoff.reset();
        backoff
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error, or
    /// the deadline is spent
    ///
    /// `operation` receives the 1-based attempt number.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error unchanged, or
    /// `PatchError::DeadlineExceeded` wrapping the last retryable error once
    /// no budget remains for another attempt
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> PatchResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = PatchResult<T>>,
    {
        let started = Instant::now();
        let mut backoff = self.backoff();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let error = match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !(self.retryable)(&error) {
                tracing::debug!("Attempt {} failed with non-retryable error: {}", attempt, error);
                return Err(error);
            }

            let elapsed = started.elapsed();
            let remaining = self.deadline.saturating_sub(elapsed);
            let delay = match backoff.next_backoff() {
                Some(delay) if !remaining.is_zero() => delay.min(remaining),
                _ => {
                    tracing::error!(
                        "Giving up after {} attempts in {:?}: {}",
                        attempt,
                        elapsed,
                        error
                    );
                    return Err(PatchError::DeadlineExceeded {
                        attempts: attempt,
                        elapsed,
                        last: Box::new(error),
                    });
                }
            };

            tracing::warn!(
                "Attempt {} failed: {}. Retrying in {}ms",
                attempt,
                error,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// TOML-friendly retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfigToml {
    /// Wall-clock budget per patch, in seconds
    pub deadline_secs: u64,
    /// First backoff delay, in milliseconds
    pub initial_interval_ms: u64,
    /// Longest single delay, in seconds
    pub max_interval_secs: u64,
    pub multiplier: f64,
    pub randomization_factor: f64,
}

impl Default for RetryConfigToml {
    fn default() -> Self {
        Self {
            deadline_secs: retry::DEADLINE.as_secs(),
            initial_interval_ms: retry::INITIAL_INTERVAL.as_millis() as u64,
            max_interval_secs: retry::MAX_INTERVAL.as_secs(),
            multiplier: retry::MULTIPLIER,
            randomization_factor: retry::RANDOMIZATION_FACTOR,
        }
    }
}

impl RetryConfigToml {
    /// Convert to runtime RetryPolicy, retrying only rate-limit errors
    pub fn to_runtime_config(&self) -> RetryPolicy {
        RetryPolicy {
            deadline: Duration::from_secs(self.deadline_secs),
            initial_interval: Duration::from_millis(self.initial_interval_ms),
            max_interval: Duration::from_secs(self.max_interval_secs),
            multiplier: self.multiplier,
            randomization_factor: self.randomization_factor,
            retryable: PatchError::is_rate_limited,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::errors::ApiError;

    fn fast_policy(deadline: Duration) -> RetryPolicy {
        RetryPolicy {
            deadline,
            initial_interval: Duration::from_millis(5),
            max_interval: Duration::from_millis(20),
            ..Default::default()
        }
    }

    fn rate_limited() -> PatchError {
        PatchError::Api(ApiError::RateLimited {
            body: "Too Many Requests".to_string(),
        })
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.deadline, Duration::from_secs(600));
        assert!((policy.retryable)(&rate_limited()));
        assert!(!(policy.retryable)(&PatchError::InvalidRequest {
            reason: String::new()
        }));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let policy = fast_policy(Duration::from_secs(5));

        let result = policy
            .run(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt <= 3 {
                        Err(rate_limited())
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_non_retryable_error_propagates_immediately() {
        let calls = AtomicU32::new(0);
        let policy = fast_policy(Duration::from_secs(5));

        let result: PatchResult<()> = policy
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(PatchError::Api(ApiError::Status {
                        status: 500,
                        body: "backend error".to_string(),
                    }))
                }
            })
            .await;

        assert!(matches!(
            result,
            Err(PatchError::Api(ApiError::Status { status: 500, .. }))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let policy = fast_policy(Duration::from_millis(150));
        let started = Instant::now();

        let result: PatchResult<()> = policy.run(|_| async { Err(rate_limited()) }).await;

        match result {
            Err(PatchError::DeadlineExceeded { attempts, last, .. }) => {
                assert!(attempts > 1);
                assert!(last.is_rate_limited());
            }
            other => panic!("Expected DeadlineExceeded, got {:?}", other),
        }
        assert!(started.elapsed() >= Duration::from_millis(150));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_toml_conversion() {
        let config = RetryConfigToml {
            deadline_secs: 30,
            ..Default::default()
        };
        let policy = config.to_runtime_config();

        assert_eq!(policy.deadline, Duration::from_secs(30));
        assert_eq!(policy.initial_interval, retry::INITIAL_INTERVAL);
    }
}
