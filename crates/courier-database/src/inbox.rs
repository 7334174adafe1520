//! Async store for the inbox queue.

use chrono::{DateTime, Utc};

use crate::models::{FailureKind, InboxEntry, InboxKind, NewInboxEvent, StatusCounts};
use crate::{queries, Database, DatabaseResult};

/// Durable, append-only record set for incoming events with atomic claim
/// primitives. All mutation goes through the transition methods below;
/// nothing outside the stores writes these rows.
#[derive(Clone)]
pub struct InboxStore {
    db: Database,
}

impl InboxStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record an incoming event as `pending`.
    ///
    /// The insert commits in its own unit of work, independent of anything
    /// the caller has in flight. Returns `false` when `(kind, key)` is
    /// already recorded.
    pub async fn enqueue(
        &self,
        kind: InboxKind,
        idempotency_key: &str,
        payload: &str,
    ) -> DatabaseResult<bool> {
        let event = NewInboxEvent {
            kind,
            idempotency_key: idempotency_key.to_string(),
            payload: payload.to_string(),
        };
        self.db
            .call(move |conn| queries::enqueue_inbox(conn, &event))
            .await
    }

    /// Claimable rows of `kind`, oldest first, up to `limit`.
    pub async fn find_claimable(
        &self,
        kind: InboxKind,
        limit: u32,
    ) -> DatabaseResult<Vec<InboxEntry>> {
        self.db
            .call(move |conn| queries::find_claimable_inbox(conn, kind, limit))
            .await
    }

    /// Atomically claim a row for processing. `false` means a concurrent
    /// claimant won.
    pub async fn claim(&self, id: i64, now: DateTime<Utc>) -> DatabaseResult<bool> {
        self.db
            .call(move |conn| queries::claim_inbox_entry(conn, id, now))
            .await
    }

    /// Finalize a claimed row as processed.
    pub async fn mark_processed(&self, id: i64, now: DateTime<Utc>) -> DatabaseResult<()> {
        self.db
            .call(move |conn| queries::mark_inbox_processed(conn, id, now))
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
            .call(move |conn| queries::mark_inbox_retry_pending(conn, id, now, &reason))
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
            .call(move |conn| queries::mark_inbox_failed(conn, id, now, &reason, failure_kind))
            .await
    }

    /// Reclaim rows stuck in `processing` since before `started_before`.
    pub async fn recover_timeout_processing(
        &self,
        kind: InboxKind,
        started_before: DateTime<Utc>,
        now: DateTime<Utc>,
        reason: &str,
    ) -> DatabaseResult<u64> {
        let reason = reason.to_string();
        self.db
            .call(move |conn| {
                queries::recover_inbox_timeouts(conn, kind, started_before, now, &reason)
            })
            .await
    }

    /// Fetch one entry by id.
    pub async fn get(&self, id: i64) -> DatabaseResult<Option<InboxEntry>> {
        self.db
            .call(move |conn| queries::get_inbox_entry(conn, id))
            .await
    }

    /// Row counts by status for `kind`.
    pub async fn counts(&self, kind: InboxKind) -> DatabaseResult<StatusCounts> {
        self.db
            .call(move |conn| queries::count_inbox_by_status(conn, kind))
            .await
    }
}
