//! Bounded exponential backoff for external HTTP calls.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// How often and how patiently a failed request is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first. `1` disables retrying.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for every later one.
    pub initial_backoff: Duration,
    /// Upper bound for a single delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// A policy with `max_attempts` attempts starting at `initial_backoff`.
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), initial_backoff, ..Self::default() }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1 << exponent).min(self.max_backoff)
    }
}

/// A failed request attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFailure {
    /// Human-readable description.
    pub message: String,
    /// Whether trying again could succeed (timeouts, 429, 5xx).
    pub retryable: bool,
}

impl RequestFailure {
    /// A failure worth retrying.
    pub fn transient(message: impl Into<String>) -> Self {
        Self { message: message.into(), retryable: true }
    }

    /// A failure that will not go away by retrying.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self { message: message.into(), retryable: false }
    }
}

/// Run `op` until it succeeds, fails permanently, or the policy is exhausted.
///
/// Returns the last failure on exhaustion.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> std::result::Result<T, RequestFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, RequestFailure>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(failure) if failure.retryable && attempt < policy.max_attempts => {
                let delay = policy.backoff_for(attempt);
                warn!(
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %failure.message,
                    "request failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(failure) => return Err(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(2000));
        assert_eq!(policy.backoff_for(10), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures_until_success() {
        let calls = &AtomicU32::new(0);
        let result = with_retry(&RetryPolicy::default(), "test", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(RequestFailure::transient("503"))
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = &AtomicU32::new(0);
        let result: std::result::Result<(), _> =
            with_retry(&RetryPolicy::default(), "test", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RequestFailure::transient("timeout"))
            })
            .await;

        assert_eq!(result.unwrap_err().message, "timeout");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let calls = &AtomicU32::new(0);
        let result: std::result::Result<(), _> =
            with_retry(&RetryPolicy::default(), "test", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RequestFailure::permanent("401 Unauthorized"))
            })
            .await;

        assert!(!result.unwrap_err().retryable);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn none_policy_runs_once() {
        let calls = &AtomicU32::new(0);
        let _ = with_retry::<(), _, _>(&RetryPolicy::none(), "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(RequestFailure::transient("429"))
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
