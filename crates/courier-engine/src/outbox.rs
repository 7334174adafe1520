//! Outbox writer and processor.

use std::sync::Arc;

use chrono::Utc;
use courier_core::{correlation, idempotency, is_retryable, Classify};
use courier_database::{
    FailureKind, MessageContent, NewOutboxMessage, OutboxEntry, OutboxMessageKind, OutboxStore,
};
use courier_slack::{ChatTransport, TransportError};
use tracing::{debug, error, warn};

use crate::inbox::ProcessReport;
use crate::retry_call::call_with_retry;
use crate::{EngineResult, RetryPolicy};

/// Producer-side entry point for notifications.
///
/// The idempotency key is derived from the ambient causal source, so a
/// handler re-executed for the same inbox row enqueues the same key and the
/// duplicate collapses. Calling this with no bound source is a contract
/// violation and fails loudly.
#[derive(Clone)]
pub struct OutboxWriter {
    store: OutboxStore,
}

impl OutboxWriter {
    pub fn new(store: OutboxStore) -> Self {
        Self { store }
    }

    /// Record a notification under the ambient source. Returns `false` when
    /// this (source, kind, target) was already recorded.
    pub async fn enqueue(&self, message: NewOutboxMessage) -> EngineResult<bool> {
        let source_key = correlation::require_source_key()?;
        let key = idempotency::outbox_key(
            &source_key,
            message.message_kind.as_str(),
            &message.target.channel_id,
            message.target.user_id.as_deref(),
        );

        let inserted = self.store.enqueue(&key, message).await?;
        if !inserted {
            debug!(source = %source_key, "Outbox write deduplicated");
        }
        Ok(inserted)
    }
}

/// Route one claimed entry to the matching transport operation.
async fn dispatch(transport: &dyn ChatTransport, entry: &OutboxEntry) -> Result<(), TransportError> {
    let target = &entry.target;

    let ephemeral_user = || {
        target.user_id.as_deref().ok_or_else(|| {
            TransportError::InvalidPayload("ephemeral message has no target user".to_string())
        })
    };

    match (entry.message_kind, &entry.content) {
        (OutboxMessageKind::ChannelText, MessageContent::Text(text)) => {
            transport
                .send_channel_text(&target.bot_token, &target.channel_id, text)
                .await
        }
        (
            OutboxMessageKind::ChannelBlocks,
            MessageContent::Blocks {
                blocks,
                fallback_text,
            },
        ) => {
            transport
                .send_channel_blocks(&target.bot_token, &target.channel_id, blocks, fallback_text)
                .await
        }
        (OutboxMessageKind::EphemeralText, MessageContent::Text(text)) => {
            transport
                .send_ephemeral_text(&target.bot_token, &target.channel_id, ephemeral_user()?, text)
                .await
        }
        (
            OutboxMessageKind::EphemeralBlocks,
            MessageContent::Blocks {
                blocks,
                fallback_text,
            },
        ) => {
            transport
                .send_ephemeral_blocks(
                    &target.bot_token,
                    &target.channel_id,
                    ephemeral_user()?,
                    blocks,
                    fallback_text,
                )
                .await
        }
        (kind, _) => Err(TransportError::InvalidPayload(format!(
            "content shape does not match message kind '{}'",
            kind.as_str()
        ))),
    }
}

/// Drains the outbox: claims claimable rows across all message kinds and
/// delivers them through the transport.
pub struct OutboxProcessor {
    store: OutboxStore,
    transport: Arc<dyn ChatTransport>,
    retry: RetryPolicy,
}

impl OutboxProcessor {
    pub fn new(store: OutboxStore, transport: Arc<dyn ChatTransport>, retry: RetryPolicy) -> Self {
        Self {
            store,
            transport,
            retry,
        }
    }

    pub fn store(&self) -> &OutboxStore {
        &self.store
    }

    /// Process up to `limit` claimable rows.
    pub async fn process_pending(&self, limit: u32) -> EngineResult<ProcessReport> {
        let mut report = ProcessReport::default();

        for entry in self.store.find_claimable(limit).await? {
            if !self.store.claim(entry.id, Utc::now()).await? {
                continue;
            }
            report.claimed += 1;

            let attempt = entry.processing_attempt + 1;
            debug!(
                entry_id = entry.id,
                kind = entry.message_kind.as_str(),
                attempt,
                "Claimed outbox entry"
            );

            let outcome = call_with_retry(self.retry.in_call_attempts, &self.retry.backoff, || {
                let transport = self.transport.clone();
                let entry = entry.clone();
                async move { dispatch(transport.as_ref(), &entry).await }
            })
            .await;

            match outcome {
                Ok(()) => {
                    self.store.mark_sent(entry.id, Utc::now()).await?;
                    report.succeeded += 1;
                }
                Err(err) => {
                    let class = err.failure_class();
                    let reason = err.to_string();
                    if !is_retryable(class) {
                        error!(
                            entry_id = entry.id,
                            attempt,
                            reason = %reason,
                            "Outbox entry rejected by the transport"
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
                            "Outbox entry parked for retry"
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
                            "Outbox entry exhausted its retry budget"
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
