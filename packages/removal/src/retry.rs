//! Retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tracing::warn;

use crate::RemovalError;

/// How many times to call the provider and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles each time.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(400),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay to wait after the 0-indexed `attempt` failed: `base * 2^attempt`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        // Checked shift so attempts >= 32 saturate instead of wrapping.
        let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(multiplier)
            .unwrap_or(Duration::MAX)
    }
}

/// Waits between attempts.
pub trait Sleeper: Send + Sync + 'static {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Real waiting on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        tokio::time::sleep(duration).boxed()
    }
}

/// Run `operation` until it succeeds, fails with a non-transient error, or the policy
/// runs out of attempts.
///
/// `operation` receives the 0-indexed attempt number.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    mut operation: F,
) -> Result<T, RemovalError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, RemovalError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_transient() => return Err(err),
            Err(err) => {
                if attempt + 1 >= attempts {
                    return Err(RemovalError::Exhausted {
                        attempts,
                        last: Box::new(err),
                    });
                }
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    attempt = attempt + 1,
                    max = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying after transient error"
                );
                sleeper.sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Classify a reqwest error as retryable or non-retryable.
///
/// Only timeouts and connection failures are retried. Everything else, including
/// body and decode errors, fails the call.
pub fn is_retryable_reqwest_error(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingSleeper {
        waits: Mutex<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
            self.waits.lock().push(duration);
            futures_util::future::ready(()).boxed()
        }
    }

    fn unavailable() -> RemovalError {
        RemovalError::Status {
            status: 503,
            message: "busy".into(),
        }
    }

    #[test]
    fn delay_doubles_from_base() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(800));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(1600));
    }

    #[test]
    fn delay_saturates() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(64), Duration::MAX);
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let sleeper = RecordingSleeper::default();
        let calls = AtomicU32::new(0);

        let result = retry_with_backoff(&RetryPolicy::default(), &sleeper, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(unavailable())
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            *sleeper.waits.lock(),
            vec![Duration::from_millis(400), Duration::from_millis(800)]
        );
    }

    #[tokio::test]
    async fn non_transient_fails_without_waiting() {
        let sleeper = RecordingSleeper::default();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> =
            retry_with_backoff(&RetryPolicy::default(), &sleeper, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(RemovalError::Status {
                        status: 400,
                        message: "bad image".into(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(RemovalError::Status { status: 400, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.waits.lock().is_empty());
    }

    #[tokio::test]
    async fn exhaustion_reports_last_error() {
        let sleeper = RecordingSleeper::default();

        let result: Result<(), _> =
            retry_with_backoff(&RetryPolicy::default(), &sleeper, |_| async {
                Err(unavailable())
            })
            .await;

        match result {
            Err(RemovalError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, RemovalError::Status { status: 503, .. }));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        // No wait after the final attempt.
        assert_eq!(sleeper.waits.lock().len(), 2);
    }
}
