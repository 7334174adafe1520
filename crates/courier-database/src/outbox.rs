//! Async store for the outbox queue.

use chrono::{DateTime, Utc};

use crate::models::{FailureKind, NewOutboxMessage, OutboxEntry, StatusCounts};
use crate::{queries, Database, DatabaseResult};

/// Durable record set for outgoing notifications. Same shape as
/// [`crate::InboxStore`] except the terminal success state is `sent` and
/// claiming spans all message kinds (one global queue).
#[derive(Clone)]
pub struct OutboxStore {
    db: Database,
}

impl OutboxStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record a notification as `pending` under a producer-derived
    /// idempotency key. Returns `false` when the key already exists.
    pub async fn enqueue(
        &self,
        idempotency_key: &str,
        message: NewOutboxMessage,
    ) -> DatabaseResult<bool> {
        let key = idempotency_key.to_string();
        self.db
            .call(move |conn| queries::enqueue_outbox(conn, &key, &message))
            .await
    }

    /// Claimable rows across all message kinds, oldest first.
    pub async fn find_claimable(&self, limit: u32) -> DatabaseResult<Vec<OutboxEntry>> {
        self.db
            .call(move |conn| queries::find_claimable_outbox(conn, limit))
            .await
    }

    /// Atomically claim a row for delivery. `false` means a concurrent
    /// claimant won.
    pub async fn claim(&self, id: i64, now: DateTime<Utc>) -> DatabaseResult<bool> {
        self.db
            .call(move |conn| queries::claim_outbox_entry(conn, id, now))
            .await
    }

    /// Finalize a claimed row as sent.
    pub async fn mark_sent(&self, id: i64, now: DateTime<Utc>) -> DatabaseResult<()> {
        self.db
            .call(move |conn| queries::mark_outbox_sent(conn, id, now))
            .await
    }

    /// Park a claimed row for a later retry poll.
    pub async fn mark_retry_pending(
        &self,
        id: i64,
        now: DateTime<Utc>,
        reason: &str,
    ) -> DatabaseResult<()> {
        let reason = reason.to_string();
        self.db
            .call(move |conn| queries::mark_outbox_retry_pending(conn, id, now, &reason))
            .await
    }

    /// Finalize a claimed row as failed.
    pub async fn mark_failed(
        &self,
        id: i64,
        now: DateTime<Utc>,
        reason: &str,
        failure_kind: FailureKind,
    ) -> DatabaseResult<()> {
        let reason = reason.to_string();
        self.db
            .call(move |conn| queries::mark_outbox_failed(conn, id, now, &reason, failure_kind))
            .await
    }

    /// Reclaim rows stuck in `processing` since before `started_before`.
    pub async fn recover_timeout_processing(
        &self,
        started_before: DateTime<Utc>,
        now: DateTime<Utc>,
        reason: &str,
    ) -> DatabaseResult<u64> {
        let reason = reason.to_string();
        self.db
            .call(move |conn| queries::recover_outbox_timeouts(conn, started_before, now, &reason))
            .await
    }

    /// Fetch one entry by id.
    pub async fn get(&self, id: i64) -> DatabaseResult<Option<OutboxEntry>> {
        self.db
            .call(move |conn| queries::get_outbox_entry(conn, id))
            .await
    }

    /// Row counts by status.
    pub async fn counts(&self) -> DatabaseResult<StatusCounts> {
        self.db.call(queries::count_outbox_by_status).await
    }
}
