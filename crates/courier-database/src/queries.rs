//! Standalone query functions over a `rusqlite::Connection`.
//!
//! Every status transition is a single conditional UPDATE guarded by the
//! current status, so arbitrary concurrent callers race safely: at most one
//! wins. Finalizers (`mark_*`) are legal only out of `processing`; a guard
//! miss raises [`DatabaseError::IllegalTransition`] rather than persisting
//! anything.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::models::{
    DeliveryTarget, FailureKind, InboxEntry, InboxKind, InboxStatus, MessageContent,
    NewInboxEvent, NewOutboxMessage, OutboxEntry, OutboxMessageKind, OutboxStatus, StatusCounts,
    MAX_FAILURE_REASON_LEN,
};
use crate::{DatabaseError, DatabaseResult};

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_opt_datetime(s: Option<String>) -> Option<DateTime<Utc>> {
    s.map(parse_datetime)
}

/// Truncate a failure reason to [`MAX_FAILURE_REASON_LEN`] bytes, on a char
/// boundary.
pub fn truncate_reason(reason: &str) -> &str {
    if reason.len() <= MAX_FAILURE_REASON_LEN {
        return reason;
    }
    let mut end = MAX_FAILURE_REASON_LEN;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    &reason[..end]
}

// ==========================================
// Inbox
// ==========================================

const INBOX_COLUMNS: &str = "id, kind, idempotency_key, payload, status, processing_attempt,
    processing_started_at, processed_at, failed_at, failure_reason, failure_kind,
    created_at, updated_at";

fn map_inbox_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<InboxEntry> {
    Ok(InboxEntry {
        id: row.get(0)?,
        kind: InboxKind::from_str(&row.get::<_, String>(1)?),
        idempotency_key: row.get(2)?,
        payload: row.get(3)?,
        status: InboxStatus::from_str(&row.get::<_, String>(4)?),
        processing_attempt: row.get(5)?,
        processing_started_at: parse_opt_datetime(row.get(6)?),
        processed_at: parse_opt_datetime(row.get(7)?),
        failed_at: parse_opt_datetime(row.get(8)?),
        failure_reason: row.get(9)?,
        failure_kind: row
            .get::<_, Option<String>>(10)?
            .map(|s| FailureKind::from_str(&s)),
        created_at: parse_datetime(row.get(11)?),
        updated_at: parse_datetime(row.get(12)?),
    })
}

/// Insert a pending inbox row.
///
/// Each statement commits on its own, so the row is durable the moment this
/// returns, independent of any state the caller is still assembling.
/// Returns `false` when `(kind, idempotency_key)` already exists (expected
/// duplicate, no new row); any other failure propagates.
pub fn enqueue_inbox(conn: &Connection, event: &NewInboxEvent) -> DatabaseResult<bool> {
    let now = Utc::now().to_rfc3339();
    let changed = conn.execute(
        "INSERT INTO inbox (kind, idempotency_key, payload, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, 'pending', ?4, ?4)
         ON CONFLICT (kind, idempotency_key) DO NOTHING",
        params![event.kind.as_str(), event.idempotency_key, event.payload, now],
    )?;
    Ok(changed == 1)
}

/// Claimable rows of one kind, oldest id first.
pub fn find_claimable_inbox(
    conn: &Connection,
    kind: InboxKind,
    limit: u32,
) -> DatabaseResult<Vec<InboxEntry>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {INBOX_COLUMNS} FROM inbox
         WHERE kind = ?1 AND status IN ('pending', 'retry_pending')
         ORDER BY id ASC LIMIT ?2"
    ))?;
    let entries = stmt
        .query_map(params![kind.as_str(), limit], map_inbox_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

/// Fetch one inbox entry by id.
pub fn get_inbox_entry(conn: &Connection, id: i64) -> DatabaseResult<Option<InboxEntry>> {
    let mut stmt =
        conn.prepare_cached(&format!("SELECT {INBOX_COLUMNS} FROM inbox WHERE id = ?1"))?;
    match stmt.query_row(params![id], map_inbox_row) {
        Ok(entry) => Ok(Some(entry)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Atomically claim a claimable inbox row.
///
/// One conditional UPDATE: move to `processing`, bump the attempt counter,
/// stamp the processing window, clear prior failure fields. `false` means a
/// concurrent claimant already won (or the row is not claimable).
pub fn claim_inbox_entry(conn: &Connection, id: i64, now: DateTime<Utc>) -> DatabaseResult<bool> {
    let changed = conn.execute(
        "UPDATE inbox SET status = 'processing',
             processing_attempt = processing_attempt + 1,
             processing_started_at = ?2,
             failed_at = NULL,
             failure_reason = NULL,
             failure_kind = NULL,
             updated_at = ?2
         WHERE id = ?1 AND status IN ('pending', 'retry_pending')",
        params![id, now.to_rfc3339()],
    )?;
    Ok(changed == 1)
}

fn inbox_status_of(conn: &Connection, id: i64) -> DatabaseResult<Option<String>> {
    match conn.query_row(
        "SELECT status FROM inbox WHERE id = ?1",
        params![id],
        |row| row.get(0),
    ) {
        Ok(status) => Ok(Some(status)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn illegal_inbox_transition(
    conn: &Connection,
    id: i64,
    target: &str,
) -> DatabaseResult<DatabaseError> {
    let current = inbox_status_of(conn, id)?;
    Ok(DatabaseError::IllegalTransition(format!(
        "inbox entry {id} cannot move to {target} from {}",
        current.as_deref().unwrap_or("<missing>")
    )))
}

/// Finalize a processing inbox row as processed (terminal success).
pub fn mark_inbox_processed(conn: &Connection, id: i64, now: DateTime<Utc>) -> DatabaseResult<()> {
    let changed = conn.execute(
        "UPDATE inbox SET status = 'processed',
             processed_at = ?2,
             processing_started_at = NULL,
             updated_at = ?2
         WHERE id = ?1 AND status = 'processing'",
        params![id, now.to_rfc3339()],
    )?;
    if changed == 0 {
        return Err(illegal_inbox_transition(conn, id, "processed")?);
    }
    Ok(())
}

/// Park a processing inbox row for a later retry poll.
pub fn mark_inbox_retry_pending(
    conn: &Connection,
    id: i64,
    now: DateTime<Utc>,
    reason: &str,
) -> DatabaseResult<()> {
    let changed = conn.execute(
        "UPDATE inbox SET status = 'retry_pending',
             failure_reason = ?3,
             processing_started_at = NULL,
             updated_at = ?2
         WHERE id = ?1 AND status = 'processing'",
        params![id, now.to_rfc3339(), truncate_reason(reason)],
    )?;
    if changed == 0 {
        return Err(illegal_inbox_transition(conn, id, "retry_pending")?);
    }
    Ok(())
}

/// Finalize a processing inbox row as failed (terminal).
pub fn mark_inbox_failed(
    conn: &Connection,
    id: i64,
    now: DateTime<Utc>,
    reason: &str,
    failure_kind: FailureKind,
) -> DatabaseResult<()> {
    let changed = conn.execute(
        "UPDATE inbox SET status = 'failed',
             failed_at = ?2,
             failure_reason = ?3,
             failure_kind = ?4,
             processing_started_at = NULL,
             updated_at = ?2
         WHERE id = ?1 AND status = 'processing'",
        params![
            id,
            now.to_rfc3339(),
            truncate_reason(reason),
            failure_kind.as_str()
        ],
    )?;
    if changed == 0 {
        return Err(illegal_inbox_transition(conn, id, "failed")?);
    }
    Ok(())
}

/// Move abandoned `processing` rows of one kind back to `retry_pending`.
///
/// A row is abandoned when its processing window started before the cutoff,
/// or never got stamped at all. Returns the number of recovered rows.
pub fn recover_inbox_timeouts(
    conn: &Connection,
    kind: InboxKind,
    started_before: DateTime<Utc>,
    now: DateTime<Utc>,
    reason: &str,
) -> DatabaseResult<u64> {
    let changed = conn.execute(
        "UPDATE inbox SET status = 'retry_pending',
             processing_started_at = NULL,
             failure_reason = ?4,
             updated_at = ?3
         WHERE kind = ?1 AND status = 'processing'
           AND (processing_started_at IS NULL OR processing_started_at < ?2)",
        params![
            kind.as_str(),
            started_before.to_rfc3339(),
            now.to_rfc3339(),
            truncate_reason(reason)
        ],
    )?;
    Ok(changed as u64)
}

/// Row counts by status for one inbox kind.
pub fn count_inbox_by_status(conn: &Connection, kind: InboxKind) -> DatabaseResult<StatusCounts> {
    let mut stmt = conn.prepare_cached(
        "SELECT status, COUNT(*) FROM inbox WHERE kind = ?1 GROUP BY status",
    )?;
    let rows = stmt.query_map(params![kind.as_str()], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;

    let mut counts = StatusCounts::default();
    for row in rows {
        let (status, n) = row?;
        let n = n as u64;
        match InboxStatus::from_str(&status) {
            InboxStatus::Pending => counts.pending = n,
            InboxStatus::Processing => counts.processing = n,
            InboxStatus::Processed => counts.succeeded = n,
            InboxStatus::RetryPending => counts.retry_pending = n,
            InboxStatus::Failed => counts.failed = n,
        }
    }
    Ok(counts)
}

// ==========================================
// Outbox
// ==========================================

const OUTBOX_COLUMNS: &str = "id, message_kind, idempotency_key, bot_token, channel_id, user_id,
    text, blocks, fallback_text, status, processing_attempt, processing_started_at,
    sent_at, failed_at, failure_reason, failure_kind, created_at, updated_at";

fn map_outbox_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<OutboxEntry> {
    let blocks: Option<String> = row.get(7)?;
    let content = match blocks {
        Some(raw) => MessageContent::Blocks {
            blocks: serde_json::from_str(&raw).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    7,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?,
            fallback_text: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
        },
        None => MessageContent::Text(row.get::<_, Option<String>>(6)?.unwrap_or_default()),
    };

    Ok(OutboxEntry {
        id: row.get(0)?,
        message_kind: OutboxMessageKind::from_str(&row.get::<_, String>(1)?),
        idempotency_key: row.get(2)?,
        target: DeliveryTarget {
            bot_token: row.get(3)?,
            channel_id: row.get(4)?,
            user_id: row.get(5)?,
        },
        content,
        status: OutboxStatus::from_str(&row.get::<_, String>(9)?),
        processing_attempt: row.get(10)?,
        processing_started_at: parse_opt_datetime(row.get(11)?),
        sent_at: parse_opt_datetime(row.get(12)?),
        failed_at: parse_opt_datetime(row.get(13)?),
        failure_reason: row.get(14)?,
        failure_kind: row
            .get::<_, Option<String>>(15)?
            .map(|s| FailureKind::from_str(&s)),
        created_at: parse_datetime(row.get(16)?),
        updated_at: parse_datetime(row.get(17)?),
    })
}

/// Insert a pending outbox row under a producer-derived idempotency key.
///
/// Returns `false` when the key already exists. Commits on its own, like
/// [`enqueue_inbox`].
pub fn enqueue_outbox(
    conn: &Connection,
    idempotency_key: &str,
    message: &NewOutboxMessage,
) -> DatabaseResult<bool> {
    let (text, blocks, fallback_text) = match &message.content {
        MessageContent::Text(text) => (Some(text.clone()), None, None),
        MessageContent::Blocks {
            blocks,
            fallback_text,
        } => (
            None,
            Some(serde_json::to_string(blocks)?),
            Some(fallback_text.clone()),
        ),
    };

    let now = Utc::now().to_rfc3339();
    let changed = conn.execute(
        "INSERT INTO outbox (message_kind, idempotency_key, bot_token, channel_id, user_id,
                             text, blocks, fallback_text, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending', ?9, ?9)
         ON CONFLICT (idempotency_key) DO NOTHING",
        params![
            message.message_kind.as_str(),
            idempotency_key,
            message.target.bot_token,
            message.target.channel_id,
            message.target.user_id,
            text,
            blocks,
            fallback_text,
            now
        ],
    )?;
    Ok(changed == 1)
}

/// Claimable outbox rows across all message kinds, oldest id first.
pub fn find_claimable_outbox(conn: &Connection, limit: u32) -> DatabaseResult<Vec<OutboxEntry>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {OUTBOX_COLUMNS} FROM outbox
         WHERE status IN ('pending', 'retry_pending')
         ORDER BY id ASC LIMIT ?1"
    ))?;
    let entries = stmt
        .query_map(params![limit], map_outbox_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

/// Fetch one outbox entry by id.
pub fn get_outbox_entry(conn: &Connection, id: i64) -> DatabaseResult<Option<OutboxEntry>> {
    let mut stmt =
        conn.prepare_cached(&format!("SELECT {OUTBOX_COLUMNS} FROM outbox WHERE id = ?1"))?;
    match stmt.query_row(params![id], map_outbox_row) {
        Ok(entry) => Ok(Some(entry)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Atomically claim a claimable outbox row. Same semantics as
/// [`claim_inbox_entry`].
pub fn claim_outbox_entry(conn: &Connection, id: i64, now: DateTime<Utc>) -> DatabaseResult<bool> {
    let changed = conn.execute(
        "UPDATE outbox SET status = 'processing',
             processing_attempt = processing_attempt + 1,
             processing_started_at = ?2,
             failed_at = NULL,
             failure_reason = NULL,
             failure_kind = NULL,
             updated_at = ?2
         WHERE id = ?1 AND status IN ('pending', 'retry_pending')",
        params![id, now.to_rfc3339()],
    )?;
    Ok(changed == 1)
}

fn outbox_status_of(conn: &Connection, id: i64) -> DatabaseResult<Option<String>> {
    match conn.query_row(
        "SELECT status FROM outbox WHERE id = ?1",
        params![id],
        |row| row.get(0),
    ) {
        Ok(status) => Ok(Some(status)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn illegal_outbox_transition(
    conn: &Connection,
    id: i64,
    target: &str,
) -> DatabaseResult<DatabaseError> {
    let current = outbox_status_of(conn, id)?;
    Ok(DatabaseError::IllegalTransition(format!(
        "outbox entry {id} cannot move to {target} from {}",
        current.as_deref().unwrap_or("<missing>")
    )))
}

/// Finalize a processing outbox row as sent (terminal success).
pub fn mark_outbox_sent(conn: &Connection, id: i64, now: DateTime<Utc>) -> DatabaseResult<()> {
    let changed = conn.execute(
        "UPDATE outbox SET status = 'sent',
             sent_at = ?2,
             processing_started_at = NULL,
             updated_at = ?2
         WHERE id = ?1 AND status = 'processing'",
        params![id, now.to_rfc3339()],
    )?;
    if changed == 0 {
        return Err(illegal_outbox_transition(conn, id, "sent")?);
    }
    Ok(())
}

/// Park a processing outbox row for a later retry poll.
pub fn mark_outbox_retry_pending(
    conn: &Connection,
    id: i64,
    now: DateTime<Utc>,
    reason: &str,
) -> DatabaseResult<()> {
    let changed = conn.execute(
        "UPDATE outbox SET status = 'retry_pending',
             failure_reason = ?3,
             processing_started_at = NULL,
             updated_at = ?2
         WHERE id = ?1 AND status = 'processing'",
        params![id, now.to_rfc3339(), truncate_reason(reason)],
    )?;
    if changed == 0 {
        return Err(illegal_outbox_transition(conn, id, "retry_pending")?);
    }
    Ok(())
}

/// Finalize a processing outbox row as failed (terminal).
pub fn mark_outbox_failed(
    conn: &Connection,
    id: i64,
    now: DateTime<Utc>,
    reason: &str,
    failure_kind: FailureKind,
) -> DatabaseResult<()> {
    let changed = conn.execute(
        "UPDATE outbox SET status = 'failed',
             failed_at = ?2,
             failure_reason = ?3,
             failure_kind = ?4,
             processing_started_at = NULL,
             updated_at = ?2
         WHERE id = ?1 AND status = 'processing'",
        params![
            id,
            now.to_rfc3339(),
            truncate_reason(reason),
            failure_kind.as_str()
        ],
    )?;
    if changed == 0 {
        return Err(illegal_outbox_transition(conn, id, "failed")?);
    }
    Ok(())
}

/// Move abandoned `processing` outbox rows back to `retry_pending`.
pub fn recover_outbox_timeouts(
    conn: &Connection,
    started_before: DateTime<Utc>,
    now: DateTime<Utc>,
    reason: &str,
) -> DatabaseResult<u64> {
    let changed = conn.execute(
        "UPDATE outbox SET status = 'retry_pending',
             processing_started_at = NULL,
             failure_reason = ?3,
             updated_at = ?2
         WHERE status = 'processing'
           AND (processing_started_at IS NULL OR processing_started_at < ?1)",
        params![
            started_before.to_rfc3339(),
            now.to_rfc3339(),
            truncate_reason(reason)
        ],
    )?;
    Ok(changed as u64)
}

/// Row counts by status for the outbox.
pub fn count_outbox_by_status(conn: &Connection) -> DatabaseResult<StatusCounts> {
    let mut stmt = conn.prepare_cached("SELECT status, COUNT(*) FROM outbox GROUP BY status")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;

    let mut counts = StatusCounts::default();
    for row in rows {
        let (status, n) = row?;
        let n = n as u64;
        match OutboxStatus::from_str(&status) {
            OutboxStatus::Pending => counts.pending = n,
            OutboxStatus::Processing => counts.processing = n,
            OutboxStatus::Sent => counts.succeeded = n,
            OutboxStatus::RetryPending => counts.retry_pending = n,
            OutboxStatus::Failed => counts.failed = n,
        }
    }
    Ok(counts)
}
