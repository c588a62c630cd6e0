/// Retry policy for outbound calls
///
/// Bounded retry with fixed or exponential backoff. Sleeping goes through the
/// `Sleeper` trait so tests can observe delays without waiting for them.

use async_trait::async_trait;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry
    Fixed,
    /// Delay doubles after each failure, capped at `max`
    Exponential { max: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(3),
            backoff: Backoff::Fixed,
        }
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: Backoff::Fixed,
        }
    }

    pub fn exponential(max_attempts: u32, delay: Duration, max: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: Backoff::Exponential { max },
        }
    }

    /// Delay before retry number `attempt` (1-based: the wait after the first failure is attempt 1)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential { max } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.delay.saturating_mul(factor).min(max)
            }
        }
    }
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real sleeper backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Outcome of a failed attempt, as classified by the caller
#[derive(Debug)]
pub enum Attempt<E> {
    /// Worth trying again
    Retry(E),
    /// Give up immediately
    Abort(E),
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E: Display> {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    #[error("{0}")]
    Aborted(E),
}

/// Run `op` until it succeeds, aborts, or the policy runs out of attempts.
///
/// `op` receives the 1-based attempt number and is re-invoked from scratch on
/// every retry, so anything time-sensitive in the request is rebuilt each time.
pub async fn run_with_retry<T, E, F, Fut>(
    label: &str,
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, Attempt<E>>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    warn!("{} recovered on attempt {}/{}", label, attempt, max_attempts);
                }
                return Ok(value);
            }
            Err(Attempt::Abort(e)) => return Err(RetryError::Aborted(e)),
            Err(Attempt::Retry(e)) => {
                if attempt >= max_attempts {
                    error!("{} failed after {} attempts: {}", label, attempt, e);
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: e,
                    });
                }

                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                    label, attempt, max_attempts, e, delay
                );
                sleeper.sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSleeper {
        slept: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }
    }

    #[test]
    fn test_fixed_and_exponential_delays() {
        let fixed = RetryPolicy::fixed(5, Duration::from_secs(3));
        assert_eq!(fixed.delay_for_attempt(1), Duration::from_secs(3));
        assert_eq!(fixed.delay_for_attempt(4), Duration::from_secs(3));

        let exp = RetryPolicy::exponential(5, Duration::from_millis(100), Duration::from_millis(500));
        assert_eq!(exp.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(exp.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(exp.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(exp.delay_for_attempt(4), Duration::from_millis(500));
        assert_eq!(exp.delay_for_attempt(40), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let sleeper = RecordingSleeper::default();
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(5, Duration::from_secs(3));

        let result: Result<u32, RetryError<String>> =
            run_with_retry("flaky", &policy, &sleeper, |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(Attempt::Retry("connection reset".to_string()))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(*sleeper.slept.lock().unwrap(), vec![Duration::from_secs(3); 2]);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_attempts() {
        let sleeper = RecordingSleeper::default();
        let policy = RetryPolicy::fixed(4, Duration::from_millis(10));

        let result: Result<(), RetryError<String>> =
            run_with_retry("down", &policy, &sleeper, |_| async {
                Err(Attempt::Retry("timeout".to_string()))
            })
            .await;

        match result {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 4);
                assert_eq!(last, "timeout");
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
        // No sleep after the final attempt
        assert_eq!(sleeper.slept.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_abort_skips_remaining_attempts() {
        let sleeper = RecordingSleeper::default();
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result: Result<(), RetryError<String>> =
            run_with_retry("rejected", &policy, &sleeper, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Attempt::Abort("HTTP 400".to_string())) }
            })
            .await;

        assert!(matches!(result, Err(RetryError::Aborted(ref e)) if e == "HTTP 400"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.slept.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_attempts_still_tries_once() {
        let sleeper = RecordingSleeper::default();
        let policy = RetryPolicy::fixed(0, Duration::from_secs(1));

        let result: Result<&str, RetryError<String>> =
            run_with_retry("once", &policy, &sleeper, |_| async { Ok("done") }).await;

        assert_eq!(result.unwrap(), "done");
    }
}
