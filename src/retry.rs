//! Bounded retries with exponential backoff for RPC and HTTP calls.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::error::Retryable;

/// Retry parameters.
///
/// `max_retries` counts retries after the first attempt, so an operation that
/// keeps failing is invoked `max_retries + 1` times.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after `delay` has been slept once. Products that do not
    /// fit a `Duration` are capped at `max_delay`.
    pub fn next_delay(&self, delay: Duration) -> Duration {
        Duration::try_from_secs_f64(delay.as_secs_f64() * self.backoff_factor)
            .map_or(self.max_delay, |next| next.min(self.max_delay))
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(format!(
                "backoffFactor must be a finite number >= 1, got {}",
                self.backoff_factor
            ));
        }
        if self.initial_delay > self.max_delay {
            return Err(format!(
                "initialDelay {:?} exceeds maxDelay {:?}",
                self.initial_delay, self.max_delay
            ));
        }
        Ok(())
    }
}

/// Runs an operation until it succeeds, fails with a non-retryable error, or
/// runs out of retries.
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Returns the last error unchanged once retries are exhausted.
    pub async fn execute<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let mut delay = self.policy.initial_delay;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) if attempt > self.policy.max_retries => {
                    tracing::warn!(attempts = attempt, error = %err, "giving up after retries");
                    return Err(err);
                }
                Err(err) => {
                    tracing::warn!(
                        "Attempt {} failed: {}. Retrying in {:.2} seconds...",
                        attempt,
                        err,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                    delay = self.policy.next_delay(delay);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_factor: 2.0,
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
        assert_eq!(policy.backoff_factor, 2.0);
    }

    #[test]
    fn test_delay_doubles_until_capped() {
        let policy = RetryPolicy::default();
        let mut delay = policy.initial_delay;
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(delay.as_secs());
            delay = policy.next_delay(delay);
        }
        assert_eq!(seen, vec![1, 2, 4, 8, 10]);
    }

    #[test]
    fn test_oversized_backoff_is_capped() {
        let policy = RetryPolicy {
            backoff_factor: 1e30,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.next_delay(Duration::from_secs(1)), Duration::from_secs(10));

        let policy = RetryPolicy {
            backoff_factor: f64::INFINITY,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.next_delay(Duration::from_secs(1)), Duration::from_secs(10));
    }

    #[test]
    fn test_policy_validation() {
        assert!(RetryPolicy::default().validate().is_ok());
        for backoff_factor in [f64::INFINITY, f64::NAN, 0.5, -2.0] {
            let policy = RetryPolicy {
                backoff_factor,
                ..RetryPolicy::default()
            };
            assert!(policy.validate().is_err(), "{backoff_factor} accepted");
        }
        let policy = RetryPolicy {
            initial_delay: Duration::from_secs(30),
            ..RetryPolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[tokio::test]
    async fn test_huge_backoff_does_not_panic() {
        let executor = RetryExecutor::new(RetryPolicy {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_factor: 1e30,
        });
        let calls = &AtomicU32::new(0);

        let result: Result<(), Error> = executor
            .execute(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Timeout)
            })
            .await;

        assert!(matches!(result, Err(Error::Timeout)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_policy_parses_humantime() {
        let policy: RetryPolicy =
            serde_json::from_str(r#"{"maxRetries": 5, "initialDelay": "250ms"}"#).unwrap();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.initial_delay, Duration::from_millis(250));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let executor = RetryExecutor::new(fast_policy(3));
        let calls = &AtomicU32::new(0);

        let result: Result<&str, Error> = executor
            .execute(move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::Timeout)
                } else {
                    Ok("quoted")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "quoted");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_original_error() {
        let executor = RetryExecutor::new(fast_policy(3));
        let calls = &AtomicU32::new(0);

        let result: Result<(), Error> = executor
            .execute(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::ContractRevert("execution reverted".to_string()))
            })
            .await;

        assert!(matches!(result, Err(Error::ContractRevert(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_immediately() {
        let executor = RetryExecutor::new(fast_policy(3));
        let calls = &AtomicU32::new(0);

        let result: Result<(), Error> = executor
            .execute(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::InvalidAmount("abc".to_string()))
            })
            .await;

        assert!(matches!(result, Err(Error::InvalidAmount(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_retries_runs_once() {
        let executor = RetryExecutor::new(fast_policy(0));
        let calls = &AtomicU32::new(0);

        let result: Result<(), Error> = executor
            .execute(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Timeout)
            })
            .await;

        assert!(matches!(result, Err(Error::Timeout)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
