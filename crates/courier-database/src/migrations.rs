//! Database migrations.
//!
//! Migrations run in order at open and are tracked in the `migrations`
//! table.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::DatabaseResult;

/// Current schema version.
pub const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> DatabaseResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    info!(current_version, target_version = CURRENT_VERSION, "Running migrations");

    if current_version < 1 {
        migrate_v1_inbox(conn)?;
    }
    if current_version < 2 {
        migrate_v2_outbox(conn)?;
    }

    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> DatabaseResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: inbox table, the durable record of incoming interaction events.
fn migrate_v1_inbox(conn: &Connection) -> DatabaseResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS inbox (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            idempotency_key TEXT NOT NULL,
            payload TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            processing_attempt INTEGER NOT NULL DEFAULT 0,
            processing_started_at TEXT,
            processed_at TEXT,
            failed_at TEXT,
            failure_reason TEXT,
            failure_kind TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (kind, idempotency_key)
        );

        CREATE INDEX IF NOT EXISTS idx_inbox_claimable
            ON inbox(kind, status, id);
        ",
    )?;

    record_migration(conn, 1, "inbox")
}

/// V2: outbox table, the durable record of outgoing notifications. A single
/// global queue: claiming is not partitioned by message kind.
fn migrate_v2_outbox(conn: &Connection) -> DatabaseResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS outbox (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            message_kind TEXT NOT NULL,
            idempotency_key TEXT NOT NULL UNIQUE,
            bot_token TEXT NOT NULL,
            channel_id TEXT NOT NULL,
            user_id TEXT,
            text TEXT,
            blocks TEXT,
            fallback_text TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            processing_attempt INTEGER NOT NULL DEFAULT 0,
            processing_started_at TEXT,
            sent_at TEXT,
            failed_at TEXT,
            failure_reason TEXT,
            failure_kind TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_outbox_claimable
            ON outbox(status, id);
        ",
    )?;

    record_migration(conn, 2, "outbox")
}
