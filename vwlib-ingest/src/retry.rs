//! Fixed-delay retry policy for outbound requests
//!
//! One policy object wraps every outbound network call instead of ad hoc
//! per-call-site loops. The delay between attempts is constant; backoff is
//! intentionally not exponential, matching the per-request timeout model.

use std::time::Duration;
use vwlib_common::config::ScraperConfig;

/// Retry parameters: attempt count and fixed inter-attempt delay
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn from_config(config: &ScraperConfig) -> Self {
        Self::new(
            config.retry_attempts,
            Duration::from_millis(config.retry_delay_ms),
        )
    }

    /// Run `operation` until it succeeds, fails non-retryably, or the
    /// attempt budget is exhausted.
    ///
    /// `retryable` classifies errors: transient ones (no response, non-2xx
    /// status) are retried after the fixed delay, anything else is returned
    /// immediately.
    pub async fn run<T, E, F, Fut, P>(
        &self,
        operation_name: &str,
        mut operation: F,
        retryable: P,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if !retryable(&err) => return Err(err),
                Err(err) if attempt >= self.max_attempts => {
                    tracing::warn!(
                        operation = operation_name,
                        attempt,
                        error = %err,
                        "Giving up after final retry attempt"
                    );
                    return Err(err);
                }
                Err(err) => {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        error = %err,
                        delay_ms = self.delay.as_millis() as u64,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    enum TestError {
        Transient,
        Hard,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    fn is_transient(e: &TestError) -> bool {
        matches!(e, TestError::Transient)
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1));
        let attempts = AtomicU32::new(0);

        let result: Result<u32, TestError> = policy
            .run(
                "test",
                || {
                    let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    async move {
                        if n < 3 {
                            Err(TestError::Transient)
                        } else {
                            Ok(n)
                        }
                    }
                },
                is_transient,
            )
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_after_attempt_budget() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let attempts = AtomicU32::new(0);

        let result: Result<(), TestError> = policy
            .run(
                "test",
                || {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    async { Err(TestError::Transient) }
                },
                is_transient,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_fail_immediately() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1));
        let attempts = AtomicU32::new(0);

        let result: Result<(), TestError> = policy
            .run(
                "test",
                || {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    async { Err(TestError::Hard) }
                },
                is_transient,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
