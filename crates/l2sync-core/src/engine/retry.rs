//! Bounded retry with exponential backoff
//!
//! Retries are owned by the engine: providers and clients make exactly one
//! remote call per invocation. Only [transient](crate::Error::is_transient)
//! errors are retried, and never past the pass deadline.

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Cap on a single backoff sleep
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Retry settings for remote calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
}

/// Result of a retried call and how many attempts it took
#[derive(Debug)]
pub struct Attempted<T> {
    /// Final result
    pub result: Result<T>,
    /// Attempts made (at least 1)
    pub attempts: u32,
}

impl RetryPolicy {
    /// Create a policy
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// A policy that never retries
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Delay before retry number `retry` (1-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(MAX_BACKOFF)
    }

    /// Run `call` until it succeeds, fails permanently, runs out of retries,
    /// or `deadline` passes
    ///
    /// Each attempt is bounded by the deadline. When the deadline expires
    /// the result is [`Error::DeadlineExceeded`].
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        deadline: Option<Instant>,
        mut call: F,
    ) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempts = 0;

        loop {
            attempts += 1;

            let result = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, call()).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::deadline(format!(
                        "{operation} did not finish before the pass deadline"
                    ))),
                },
                None => call().await,
            };

            let error = match result {
                Ok(value) => {
                    return Attempted {
                        result: Ok(value),
                        attempts,
                    };
                }
                Err(e) => e,
            };

            if !error.is_transient() || attempts > self.max_retries {
                return Attempted {
                    result: Err(error),
                    attempts,
                };
            }

            let delay = self.backoff(attempts);
            if let Some(deadline) = deadline
                && Instant::now() + delay >= deadline
            {
                return Attempted {
                    result: Err(Error::deadline(format!(
                        "no time left to retry {operation} after: {error}"
                    ))),
                    attempts,
                };
            }

            warn!(
                operation,
                attempt = attempts,
                max_retries = self.max_retries,
                error = %error,
                "Transient failure, retrying in {:?}",
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn failing_then_ok(
        failures: u32,
        error: fn() -> Error,
    ) -> (Arc<AtomicU32>, impl FnMut() -> std::future::Ready<Result<&'static str>>) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let call = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(if n < failures { Err(error()) } else { Ok("done") })
        };
        (calls, call)
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(10, Duration::from_secs(5));
        assert_eq!(policy.backoff(1), Duration::from_secs(5));
        assert_eq!(policy.backoff(2), Duration::from_secs(10));
        assert_eq!(policy.backoff(3), Duration::from_secs(20));
        assert_eq!(policy.backoff(8), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn transient_errors_retried_until_success() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let (calls, call) = failing_then_ok(2, || Error::http("503"));

        let attempted = policy.run("fetch", None, call).await;

        tokio_test::assert_ok!(attempted.result);
        assert_eq!(attempted.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_bounded_by_max_retries() {
        let policy = RetryPolicy::new(2, Duration::from_millis(1));
        let (calls, call) = failing_then_ok(u32::MAX, || Error::rate_limited("Throttling"));

        let attempted = policy.run("fetch", None, call).await;

        tokio_test::assert_err!(attempted.result);
        assert_eq!(attempted.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_not_retried() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1));
        let (calls, call) = failing_then_ok(u32::MAX, || Error::auth("bad key"));

        let attempted = policy.run("fetch", None, call).await;

        assert!(matches!(attempted.result, Err(Error::Authentication(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_retries_makes_one_attempt() {
        let (calls, call) = failing_then_ok(u32::MAX, || Error::http("reset"));

        let attempted = RetryPolicy::none().run("fetch", None, call).await;

        tokio_test::assert_err!(attempted.result);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn deadline_bounds_a_slow_call() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let deadline = Instant::now() + Duration::from_millis(50);

        let attempted = policy
            .run("sync group", Some(deadline), || async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;

        assert!(matches!(attempted.result, Err(Error::DeadlineExceeded(_))));
        assert_eq!(attempted.attempts, 1);
    }

    #[tokio::test]
    async fn no_retry_when_backoff_would_pass_deadline() {
        let policy = RetryPolicy::new(3, Duration::from_secs(30));
        let deadline = Instant::now() + Duration::from_secs(1);
        let (calls, call) = failing_then_ok(u32::MAX, || Error::http("503"));

        let attempted = policy.run("fetch", Some(deadline), call).await;

        assert!(matches!(attempted.result, Err(Error::DeadlineExceeded(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
