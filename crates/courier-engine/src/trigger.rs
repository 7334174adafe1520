//! Best-effort immediate processing kick.

use std::sync::Arc;

use courier_database::InboxKind;
use tracing::warn;

use crate::{InboxProcessor, OutboxProcessor};

/// Post-commit, low-latency kick of a processor.
///
/// `fire_*` must only be called after the enqueue call has returned: the
/// stores commit each insert in its own unit of work, so at that point the
/// row is durable. A caller composing its own surrounding transaction must
/// fire only after committing it, since kicking a processor at a row whose
/// insert could still roll back would violate the claim semantics.
///
/// The kick processes at most one row and swallows every error: the caller
/// that merely enqueued must never see a processing failure, and the
/// polling workers are the correctness backstop for anything the kick
/// misses.
#[derive(Clone)]
pub struct ImmediateTrigger {
    inbox: Arc<InboxProcessor>,
    outbox: Arc<OutboxProcessor>,
}

impl ImmediateTrigger {
    pub fn new(inbox: Arc<InboxProcessor>, outbox: Arc<OutboxProcessor>) -> Self {
        Self { inbox, outbox }
    }

    /// Kick the inbox processor for one row of `kind`.
    pub fn fire_inbox(&self, kind: InboxKind) {
        let processor = self.inbox.clone();
        tokio::spawn(async move {
            if let Err(e) = processor.process_pending(kind, 1).await {
                warn!(
                    kind = kind.as_str(),
                    error = %e,
                    "Immediate inbox processing failed; polling will pick the row up"
                );
            }
        });
    }

    /// Kick the outbox processor for one row.
    pub fn fire_outbox(&self) {
        let processor = self.outbox.clone();
        tokio::spawn(async move {
            if let Err(e) = processor.process_pending(1).await {
                warn!(
                    error = %e,
                    "Immediate outbox processing failed; polling will pick the row up"
                );
            }
        });
    }
}
