//! Inbox processor: claim, execute, finalize.

use std::sync::Arc;

use chrono::Utc;
use courier_core::{correlation, is_retryable, Classify, FailureClass};
use courier_database::{FailureKind, InboxKind, InboxStore};
use tracing::{debug, error, warn};

use crate::handler::HandlerRegistry;
use crate::retry_call::call_with_retry;
use crate::{EngineError, EngineResult, RetryPolicy};

/// What one poll accomplished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessReport {
    /// Rows this poll claimed.
    pub claimed: u32,
    /// Rows finalized as the terminal success state.
    pub succeeded: u32,
    /// Rows parked for a later retry poll.
    pub retried: u32,
    /// Rows finalized as failed.
    pub failed: u32,
}

/// Drains the inbox by kind: claims claimable rows, runs the registered
/// business handler under a source-correlation scope, and persists the
/// outcome.
pub struct InboxProcessor {
    store: InboxStore,
    handlers: Arc<HandlerRegistry>,
    retry: RetryPolicy,
}

impl InboxProcessor {
    pub fn new(store: InboxStore, handlers: Arc<HandlerRegistry>, retry: RetryPolicy) -> Self {
        Self {
            store,
            handlers,
            retry,
        }
    }

    pub fn store(&self) -> &InboxStore {
        &self.store
    }

    /// Process up to `limit` claimable rows of `kind`.
    ///
    /// A lost claim race is skipped silently. Handler failures become queue
    /// states per the retry classification; contract violations propagate.
    pub async fn process_pending(
        &self,
        kind: InboxKind,
        limit: u32,
    ) -> EngineResult<ProcessReport> {
        let handler = self
            .handlers
            .get(kind)
            .ok_or(EngineError::NoHandler(kind.as_str()))?;

        let mut report = ProcessReport::default();

        for entry in self.store.find_claimable(kind, limit).await? {
            if !self.store.claim(entry.id, Utc::now()).await? {
                // A concurrent worker won the row. Expected, not an error.
                continue;
            }
            report.claimed += 1;

            // The claim we just won bumped the persisted counter past the
            // snapshot we fetched.
            let attempt = entry.processing_attempt + 1;
            debug!(entry_id = entry.id, kind = kind.as_str(), attempt, "Claimed inbox entry");

            let handler = handler.clone();
            let outcome = correlation::with_inbox_source(entry.id, async {
                call_with_retry(self.retry.in_call_attempts, &self.retry.backoff, || {
                    let handler = handler.clone();
                    let entry = entry.clone();
                    async move { handler.handle(&entry).await }
                })
                .await
            })
            .await;

            match outcome {
                Ok(()) => {
                    self.store.mark_processed(entry.id, Utc::now()).await?;
                    report.succeeded += 1;
                }
                Err(err) => {
                    let class = err.failure_class();
                    if class == FailureClass::Contract {
                        return Err(err.into_engine());
                    }

                    let reason = err.to_string();
                    if !is_retryable(class) {
                        error!(
                            entry_id = entry.id,
                            attempt,
                            reason = %reason,
                            "Inbox entry failed on a business invariant"
                        );
                        self.store
                            .mark_failed(
                                entry.id,
                                Utc::now(),
                                &reason,
                                FailureKind::BusinessInvariant,
                            )
                            .await?;
                        report.failed += 1;
                    } else if attempt < self.retry.max_attempts {
                        warn!(
                            entry_id = entry.id,
                            attempt,
                            max_attempts = self.retry.max_attempts,
                            reason = %reason,
                            "Inbox entry parked for retry"
                        );
                        self.store
                            .mark_retry_pending(entry.id, Utc::now(), &reason)
                            .await?;
                        report.retried += 1;
                    } else {
                        error!(
                            entry_id = entry.id,
                            attempt,
                            reason = %reason,
                            "Inbox entry exhausted its retry budget"
                        );
                        self.store
                            .mark_failed(entry.id, Utc::now(), &reason, FailureKind::RetryExhausted)
                            .await?;
                        report.failed += 1;
                    }
                }
            }
        }

        Ok(report)
    }
}
