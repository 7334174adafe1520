//! Causal idempotency of outbox writes.

use courier_core::correlation::{with_business_event_source, with_inbox_source};
use courier_database::{InboxKind, InboxStatus};

use super::harness::{
    channel_text_message, engine_with, manual_config, registry_with, FailureMode, TestHandler,
};
use crate::EngineError;

#[tokio::test]
async fn writing_without_a_bound_source_is_fatal() {
    let fixture = engine_with(registry_with(TestHandler::ok()), manual_config()).await;
    let writer = fixture.engine.outbox_writer();

    let err = writer
        .enqueue(channel_text_message("orphan"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SourceBinding(_)));

    // Nothing was persisted.
    let counts = fixture.engine.outbox_store().counts().await.unwrap();
    assert_eq!(counts.pending, 0);
}

#[tokio::test]
async fn same_source_collapses_to_one_row() {
    let fixture = engine_with(registry_with(TestHandler::ok()), manual_config()).await;
    let writer = fixture.engine.outbox_writer();

    // Re-execution after a retry replays the same inbox source.
    let first = with_inbox_source(7, writer.enqueue(channel_text_message("hi")))
        .await
        .unwrap();
    let second = with_inbox_source(7, writer.enqueue(channel_text_message("hi")))
        .await
        .unwrap();

    assert!(first);
    assert!(!second);
    let counts = fixture.engine.outbox_store().counts().await.unwrap();
    assert_eq!(counts.pending, 1);
}

#[tokio::test]
async fn distinct_sources_produce_distinct_rows() {
    let fixture = engine_with(registry_with(TestHandler::ok()), manual_config()).await;
    let writer = fixture.engine.outbox_writer();

    assert!(with_inbox_source(1, writer.enqueue(channel_text_message("hi")))
        .await
        .unwrap());
    assert!(with_inbox_source(2, writer.enqueue(channel_text_message("hi")))
        .await
        .unwrap());
    assert!(
        with_business_event_source("evt-9", writer.enqueue(channel_text_message("hi")))
            .await
            .unwrap()
    );

    let counts = fixture.engine.outbox_store().counts().await.unwrap();
    assert_eq!(counts.pending, 3);
}

#[tokio::test]
async fn handler_reexecution_does_not_duplicate_notifications() {
    use courier_database::OutboxStore;

    use super::harness::{engine_on, open_db};
    use crate::OutboxWriter;

    // The handler writes a notification and then fails transiently; the
    // retry re-executes it for the same inbox row. The second write must
    // collapse onto the first.
    let db = open_db().await;
    let writer = OutboxWriter::new(OutboxStore::new(db.clone()));
    let handler = TestHandler::notifying_flaky(
        writer,
        channel_text_message("standup time"),
        vec![FailureMode::Transient],
    );

    let mut config = manual_config();
    config.retry.max_attempts = 3;
    let fixture = engine_on(db, registry_with(handler.clone()), config);

    let store = fixture.engine.inbox_store();
    store
        .enqueue(InboxKind::BlockAction, "K", "{}")
        .await
        .unwrap();

    // First poll: the handler writes the notification, then fails.
    fixture
        .engine
        .inbox_processor()
        .process_pending(InboxKind::BlockAction, 10)
        .await
        .unwrap();
    assert_eq!(handler.invocations(), 1);

    // Second poll: re-execution writes again under the same source key.
    fixture
        .engine
        .inbox_processor()
        .process_pending(InboxKind::BlockAction, 10)
        .await
        .unwrap();
    assert_eq!(handler.invocations(), 2);

    let entry = store.get(1).await.unwrap().unwrap();
    assert_eq!(entry.status, InboxStatus::Processed);

    // Exactly one outbox row despite two handler executions.
    let counts = fixture.engine.outbox_store().counts().await.unwrap();
    assert_eq!(counts.pending, 1);
}
