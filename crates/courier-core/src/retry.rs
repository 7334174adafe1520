//! Failure classification and backoff computation.
//!
//! Classification decides whether a failure is worth retrying: only a fixed
//! allow-list of transient categories retries, everything else fails fast.
//! An unknown failure retried forever would mask a latent bug.

use std::time::Duration;

use rand::Rng;

/// Category of a processing failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The operation did not complete in time.
    Timeout,
    /// Transient connectivity failure.
    Network,
    /// The remote side asked us to slow down.
    RateLimited,
    /// A business rule rejected the work; retrying cannot succeed.
    Invariant,
    /// A programming-contract violation (illegal state transition, missing
    /// source binding). Never persisted as a queue state; always
    /// propagated.
    Contract,
    /// Anything else. Non-retryable by default.
    Internal,
}

/// Errors that can be sorted into a [`FailureClass`].
pub trait Classify {
    fn failure_class(&self) -> FailureClass;
}

/// Whether a failure class is on the transient allow-list.
pub fn is_retryable(class: FailureClass) -> bool {
    matches!(
        class,
        FailureClass::Timeout | FailureClass::Network | FailureClass::RateLimited
    )
}

/// Exponential backoff parameters.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub initial: Duration,
    /// Growth factor per attempt.
    pub multiplier: f64,
    /// Cap on the computed delay.
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            multiplier: 2.0,
            max: Duration::from_secs(5),
        }
    }
}

/// Compute the backoff delay before retry number `attempt` (1-based).
///
/// `delay = initial * multiplier^(attempt - 1)`, capped at `max`.
/// Attempt 0 means "never failed yet" and gets no delay.
pub fn compute_backoff(attempt: u32, policy: &BackoffPolicy) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let initial_ms = policy.initial.as_millis() as f64;
    let max_ms = policy.max.as_millis() as f64;
    let delay_ms = initial_ms * policy.multiplier.powi(attempt.saturating_sub(1) as i32);
    let delay_ms = delay_ms.min(max_ms).max(0.0);

    Duration::from_millis(delay_ms as u64)
}

/// Apply full jitter: a uniform random delay in `[0, delay]`.
pub fn jittered(delay: Duration) -> Duration {
    if delay.is_zero() {
        return delay;
    }
    let ms = rand::thread_rng().gen_range(0..=delay.as_millis() as u64);
    Duration::from_millis(ms)
}
