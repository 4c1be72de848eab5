//! Bounded retry with a fixed inter-attempt delay.
//!
//! Every remote operation goes through [`retry`] (or [`retry_if`] when the
//! caller has its own notion of what is worth retrying). Errors for which
//! the predicate returns `false` end the loop on the spot.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use streamctl_common::{Error, Result};

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first. Zero behaves as one.
    pub max_attempts: u32,
    /// Pause between consecutive attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// A single attempt with no retries.
    pub const fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// One initial attempt plus up to `max_retries` retries.
    pub const fn with_retries(max_retries: u32, delay: Duration) -> Self {
        Self::new(max_retries.saturating_add(1), delay)
    }

    fn backoff(self) -> FixedAttempts {
        FixedAttempts {
            policy: self,
            failures: 0,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

/// [`Backoff`] that yields `delay` until `max_attempts` failures are seen.
#[derive(Debug)]
struct FixedAttempts {
    policy: RetryPolicy,
    failures: u32,
}

impl Backoff for FixedAttempts {
    fn next_backoff(&mut self) -> Option<Duration> {
        self.failures += 1;
        if self.failures >= self.policy.max_attempts.max(1) {
            None
        } else {
            Some(self.policy.delay)
        }
    }

    fn reset(&mut self) {
        self.failures = 0;
    }
}

/// Run `op` under `policy`, retrying while `should_retry` accepts the error.
pub async fn retry_if<T, E, Op, Fut, P>(
    policy: RetryPolicy,
    label: &str,
    should_retry: P,
    mut op: Op,
) -> std::result::Result<T, E>
where
    E: std::fmt::Display,
    Op: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0u32;
    let should_retry = &should_retry;
    backoff::future::retry(policy.backoff(), || {
        attempt += 1;
        let current = attempt;
        let fut = op();
        async move {
            fut.await.map_err(|e| {
                if should_retry(&e) {
                    tracing::warn!(
                        op = label,
                        attempt = current,
                        max_attempts = policy.max_attempts,
                        error = %e,
                        "Attempt failed, will retry if attempts remain"
                    );
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        }
    })
    .await
}

/// Run `op` under `policy`, retrying only [`Error::is_retryable`] errors.
pub async fn retry<T, Op, Fut>(policy: RetryPolicy, label: &str, op: Op) -> Result<T>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_if(policy, label, Error::is_retryable, op).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    const FAST: Duration = Duration::from_millis(1);

    #[tokio::test]
    async fn transient_errors_retry_up_to_limit() {
        let calls = &AtomicU32::new(0);
        let result: Result<()> = retry(RetryPolicy::new(4, FAST), "test", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::transient("edge-1", "connection reset"))
        })
        .await;

        assert!(matches!(result, Err(Error::TransientTransport { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn fatal_errors_do_not_retry() {
        let calls = &AtomicU32::new(0);
        let result: Result<()> = retry(RetryPolicy::new(5, FAST), "test", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::fatal_auth("edge-1", "Permission denied"))
        })
        .await;

        assert!(matches!(result, Err(Error::FatalAuth { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failure() {
        let calls = &AtomicU32::new(0);
        let result = retry(RetryPolicy::new(3, FAST), "test", || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(Error::transient("edge-1", "timeout"))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn custom_predicate() {
        let calls = &AtomicU32::new(0);
        let result: std::result::Result<(), String> =
            retry_if(RetryPolicy::new(5, FAST), "test", |e: &String| e == "again", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("again".to_string())
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn with_retries_counts_first_attempt() {
        assert_eq!(RetryPolicy::with_retries(2, FAST).max_attempts, 3);
        assert_eq!(RetryPolicy::once().max_attempts, 1);
    }
}
