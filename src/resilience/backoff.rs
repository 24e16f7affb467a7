use log::{error, warn};
use rand::Rng;
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Retry executor settings: attempt ceiling, exponential base wait and the
/// jitter fraction applied on top of each computed wait.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub max_attempts: u32,
    pub base_wait: Duration,
    /// Fraction of the computed wait added as uniform random jitter (0..=1)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_wait: Duration::from_secs(2),
            jitter: 0.3,
        }
    }
}

/// Terminal outcome of a retried operation that never succeeded
#[derive(Debug)]
pub enum RetryError<E> {
    /// All attempts failed; wraps the last error seen
    Exhausted { attempts: u32, last_error: E },
    /// The error was not in the retryable set and propagated immediately
    NonRetryable(E),
}

impl<E> RetryError<E> {
    /// Unwrap back to the underlying operation error
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last_error, .. } => last_error,
            RetryError::NonRetryable(e) => e,
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Exhausted {
                attempts,
                last_error,
            } => write!(f, "retry exhausted after {} attempts: {}", attempts, last_error),
            RetryError::NonRetryable(e) => write!(f, "non-retryable error: {}", e),
        }
    }
}

impl<E: fmt::Display + fmt::Debug> std::error::Error for RetryError<E> {}

/// Run `operation` up to `config.max_attempts` times with exponential backoff
/// and uniform jitter between attempts.
///
/// The wait before attempt `n+1` is `base * 2^(n-1) + uniform(0, jitter * base
/// * 2^(n-1))`. Errors rejected by `is_retryable` propagate immediately
/// without sleeping. Stateless across invocations.
pub async fn retry_with_backoff<T, E, F, Fut, R>(
    config: &BackoffConfig,
    is_retryable: R,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if !is_retryable(&e) {
                    return Err(RetryError::NonRetryable(e));
                }

                if attempt == max_attempts {
                    error!(
                        "Operation failed after {} attempts. Final error: {}",
                        max_attempts, e
                    );
                    return Err(RetryError::Exhausted {
                        attempts: max_attempts,
                        last_error: e,
                    });
                }

                let wait = config.base_wait.as_secs_f64() * 2f64.powi(attempt as i32 - 1);
                let jitter_max = config.jitter * wait;
                let jitter = if jitter_max > 0.0 {
                    rand::thread_rng().gen_range(0.0..jitter_max)
                } else {
                    0.0
                };
                let total_wait = wait + jitter;

                warn!(
                    "Attempt {}/{} failed: {}. Waiting {:.2}s before retrying",
                    attempt, max_attempts, e, total_wait
                );

                tokio::time::sleep(Duration::from_secs_f64(total_wait)).await;
            }
        }
    }

    unreachable!()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_attempts: u32) -> BackoffConfig {
        BackoffConfig {
            max_attempts,
            base_wait: Duration::from_millis(1),
            jitter: 0.3,
        }
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result: Result<u32, RetryError<String>> =
            retry_with_backoff(&fast_config(5), |_| true, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result: Result<&str, RetryError<String>> =
            retry_with_backoff(&fast_config(5), |_| true, move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err("flaky".to_string())
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_wraps_last_error() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result: Result<(), RetryError<String>> =
            retry_with_backoff(&fast_config(3), |_| true, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("always down".to_string())
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(RetryError::Exhausted {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error, "always down");
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_retryable_propagates_without_retry() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result: Result<(), RetryError<String>> = retry_with_backoff(
            &fast_config(5),
            |e: &String| e != "fatal",
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("fatal".to_string())
            },
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(RetryError::NonRetryable(_))));
    }
}
