//! Submission retry policy.
//!
//! Only transport timeouts are retried. Everything else (DNS failure,
//! refused connection, HTTP error status, malformed body) fails the batch
//! on the first attempt.

use crate::transport::GatewayError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the n-th failed attempt is `base_delay_ms * n`.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay_ms: 2000,
        }
    }
}

pub trait ResiliencePolicy: Send + Sync {
    /// `attempt` is the 1-based number of the attempt that just failed.
    fn should_retry(&self, attempt: u32, error: &GatewayError) -> Option<Duration>;
}

pub struct TimeoutRetry {
    config: RetryConfig,
}

impl TimeoutRetry {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Linear backoff: 2s, 4s, 6s, ... with the default base.
    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.config.base_delay_ms.saturating_mul(attempt as u64))
    }
}

impl ResiliencePolicy for TimeoutRetry {
    fn should_retry(&self, attempt: u32, error: &GatewayError) -> Option<Duration> {
        if attempt >= self.config.max_attempts || !error.is_retryable() {
            return None;
        }
        Some(self.backoff(attempt))
    }
}

/// Run `op` until it succeeds or `policy` declines another attempt.
pub async fn retry_with<P, F, Fut, T>(policy: &P, mut op: F) -> Result<T, GatewayError>
where
    P: ResiliencePolicy + ?Sized,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => match policy.should_retry(attempt, &err) {
                Some(delay) => {
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "gateway call timed out, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => return Err(err),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn timeout() -> GatewayError {
        GatewayError::Timeout("read timed out".into())
    }

    #[test]
    fn test_only_timeouts_are_retried() {
        let policy = TimeoutRetry::new(RetryConfig::default());
        assert_eq!(policy.should_retry(1, &timeout()), Some(Duration::from_secs(2)));
        assert_eq!(
            policy.should_retry(1, &GatewayError::Unavailable("connection refused".into())),
            None
        );
        assert_eq!(
            policy.should_retry(1, &GatewayError::Http { status: 503, message: String::new() }),
            None
        );
        assert_eq!(policy.should_retry(2, &timeout()), None);
    }

    #[test]
    fn test_backoff_grows_linearly() {
        let policy = TimeoutRetry::new(RetryConfig {
            max_attempts: 3,
            base_delay_ms: 2000,
        });
        assert_eq!(policy.should_retry(1, &timeout()), Some(Duration::from_secs(2)));
        assert_eq!(policy.should_retry(2, &timeout()), Some(Duration::from_secs(4)));
        assert_eq!(policy.should_retry(3, &timeout()), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_with_recovers_after_timeout() {
        let policy = TimeoutRetry::new(RetryConfig::default());
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();
        let value = retry_with(&policy, |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(timeout())
                } else {
                    Ok("job-7")
                }
            }
        })
        .await;
        tokio_test::assert_ok!(&value);
        assert_eq!(value.unwrap(), "job-7");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_with_gives_up() {
        let policy = TimeoutRetry::new(RetryConfig::default());
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with(&policy, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(timeout()) }
        })
        .await;
        assert_eq!(result, Err(timeout()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
