//! Engine configuration.
//!
//! Plain structs with defaults; the embedding process decides where the
//! values come from.

use std::time::Duration;

use courier_core::BackoffPolicy;

/// Configuration for one polling worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Whether the worker runs at all.
    pub enabled: bool,
    /// Delay between polls.
    pub poll_delay: Duration,
    /// Maximum rows to claim per poll.
    pub batch_size: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_delay: Duration::from_secs(1),
            batch_size: 10,
        }
    }
}

/// Retry budget shared by both processors.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum processing attempts per entry before the row fails
    /// permanently as retry-exhausted. Counted by the claim counter.
    pub max_attempts: i32,
    /// Attempts within one poll before giving up for this invocation.
    /// This inner loop only retries transient failures; the cross-poll
    /// retry-pending cycle is the outer budget.
    pub in_call_attempts: u32,
    /// Backoff between in-call attempts (jittered).
    pub backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            in_call_attempts: 2,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Recovery scanner configuration.
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Delay between scans.
    pub scan_delay: Duration,
    /// How long a row may sit in `processing` before it counts as
    /// abandoned.
    pub processing_timeout: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            scan_delay: Duration::from_secs(30),
            processing_timeout: Duration::from_secs(300),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub inbox_worker: WorkerConfig,
    pub outbox_worker: WorkerConfig,
    pub retry: RetryPolicy,
    pub recovery: RecoveryConfig,
    pub trigger: TriggerConfig,
}

/// Immediate-trigger configuration.
#[derive(Debug, Clone)]
pub struct TriggerConfig {
    /// Whether enqueue operations kick a processor immediately. Triggering
    /// is best-effort latency only; the polling workers remain the
    /// delivery guarantee and must stay enabled alongside it.
    pub enabled: bool,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::default();
        assert!(config.inbox_worker.enabled);
        assert!(config.outbox_worker.enabled);
        assert!(config.trigger.enabled);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.in_call_attempts, 2);
        assert!(config.recovery.processing_timeout > config.inbox_worker.poll_delay);
    }
}
