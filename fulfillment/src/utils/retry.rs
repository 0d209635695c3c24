//! Bounded outbound calls
//!
//! Collaborator calls on a request path get a per-attempt timeout and at most
//! one retry. Anything beyond that belongs to a background job.

use std::future::Future;
use std::time::Duration;

/// Attempts per call, the first try included
pub const MAX_ATTEMPTS: usize = 2;

/// Pause before the retry
const RETRY_DELAY: Duration = Duration::from_millis(50);

/// Errors produced by bounded calls
pub trait CallError: std::fmt::Display {
    /// Error for an attempt that exceeded its timeout
    fn timed_out(after: Duration) -> Self;

    /// Transient failures worth one more attempt
    fn is_retryable(&self) -> bool;
}

/// Run `operation` with a timeout per attempt, retrying once on a
/// retryable failure
pub async fn call_with_retry<F, Fut, T, E>(
    label: &'static str,
    timeout: Duration,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: CallError,
{
    let mut attempt = 1;
    loop {
        let result = match tokio::time::timeout(timeout, operation()).await {
            Ok(result) => result,
            Err(_) => Err(E::timed_out(timeout)),
        };

        match result {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(call = label, attempt, "Call succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if attempt < MAX_ATTEMPTS && err.is_retryable() => {
                tracing::warn!(call = label, attempt, error = %err, "Call failed, retrying");
                tokio::time::sleep(RETRY_DELAY).await;
                attempt += 1;
            }
            Err(err) => {
                tracing::error!(call = label, attempt, error = %err, "Call failed");
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, PartialEq)]
    enum FlakyError {
        Timeout,
        Transient,
        Fatal,
    }

    impl std::fmt::Display for FlakyError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    impl CallError for FlakyError {
        fn timed_out(_after: Duration) -> Self {
            FlakyError::Timeout
        }

        fn is_retryable(&self) -> bool {
            !matches!(self, FlakyError::Fatal)
        }
    }

    #[tokio::test]
    async fn test_retries_once_then_succeeds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let result: Result<u32, FlakyError> =
            call_with_retry("flaky.call", Duration::from_secs(1), move || {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(FlakyError::Transient)
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_second_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let result: Result<u32, FlakyError> =
            call_with_retry("flaky.call", Duration::from_secs(1), move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(FlakyError::Transient)
                }
            })
            .await;
        assert_eq!(result, Err(FlakyError::Transient));
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let result: Result<u32, FlakyError> =
            call_with_retry("flaky.call", Duration::from_secs(1), move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(FlakyError::Fatal)
                }
            })
            .await;
        assert_eq!(result, Err(FlakyError::Fatal));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_attempts_time_out() {
        let result: Result<u32, FlakyError> =
            call_with_retry("flaky.call", Duration::from_millis(10), || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(1)
            })
            .await;
        assert_eq!(result, Err(FlakyError::Timeout));
    }
}
