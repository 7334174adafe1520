//! Bounded in-call retry.
//!
//! This inner loop retries purely transient failures within one processor
//! invocation. It is distinct from the cross-poll retry-pending cycle: the
//! outer budget is counted by the claim counter, this one resets every
//! poll.

use std::future::Future;

use courier_core::{compute_backoff, is_retryable, jittered, BackoffPolicy, Classify};
use tracing::debug;

/// Run `op` up to `attempts` times, sleeping a jittered exponential backoff
/// between transient failures. Non-retryable failures return immediately.
pub(crate) async fn call_with_retry<T, E, F, Fut>(
    attempts: u32,
    backoff: &BackoffPolicy,
    mut op: F,
) -> Result<T, E>
where
    E: Classify + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt >= attempts.max(1) || !is_retryable(e.failure_class()) {
                    return Err(e);
                }
                let delay = jittered(compute_backoff(attempt, backoff));
                debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, retrying within this poll"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::FailureClass;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Debug)]
    struct TestError(FailureClass);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self.0)
        }
    }

    impl Classify for TestError {
        fn failure_class(&self) -> FailureClass {
            self.0
        }
    }

    fn fast_backoff() -> BackoffPolicy {
        BackoffPolicy {
            initial: Duration::from_millis(1),
            multiplier: 2.0,
            max: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn transient_failure_retries_up_to_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), TestError> = call_with_retry(3, &fast_backoff(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError(FailureClass::Network)) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, TestError> = call_with_retry(2, &fast_backoff(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(TestError(FailureClass::Timeout))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_failure_does_not_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<(), TestError> = call_with_retry(3, &fast_backoff(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError(FailureClass::Invariant)) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_attempt_budget_still_runs_once() {
        let calls = AtomicU32::new(0);
        let result: Result<(), TestError> = call_with_retry(0, &fast_backoff(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError(FailureClass::Network)) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
