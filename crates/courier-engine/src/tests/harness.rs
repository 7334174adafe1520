//! Test harness for engine integration tests.
//!
//! Provides:
//! - MockTransport: records every send, with scriptable failures
//! - TestHandler: scriptable business handler, optionally writing outbox
//!   notifications
//! - TestEngine: an engine over an in-memory database

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use courier_core::BackoffPolicy;
use courier_database::{
    Database, DeliveryTarget, InboxEntry, InboxKind, MessageContent, NewOutboxMessage,
    OutboxMessageKind,
};
use courier_slack::{ChatTransport, TransportError, TransportResult};

use crate::{
    DeliveryEngine, EngineConfig, HandlerError, HandlerRegistry, HandlerResult, InboxHandler,
    OutboxWriter, RetryPolicy, TriggerConfig, WorkerConfig,
};

/// One message the mock transport accepted.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub operation: &'static str,
    pub bot_token: String,
    pub channel_id: String,
    pub user_id: Option<String>,
    pub text: String,
    pub blocks: Option<serde_json::Value>,
}

/// Records sends; failures queued with [`queue_failure`](Self::queue_failure)
/// are returned (in order) instead of recording.
#[derive(Default)]
pub struct MockTransport {
    sent: Mutex<Vec<SentMessage>>,
    failures: Mutex<VecDeque<TransportError>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn queue_failure(&self, error: TransportError) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    fn accept(&self, message: SentMessage) -> TransportResult<()> {
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn send_channel_text(
        &self,
        bot_token: &str,
        channel_id: &str,
        text: &str,
    ) -> TransportResult<()> {
        self.accept(SentMessage {
            operation: "channel_text",
            bot_token: bot_token.to_string(),
            channel_id: channel_id.to_string(),
            user_id: None,
            text: text.to_string(),
            blocks: None,
        })
    }

    async fn send_channel_blocks(
        &self,
        bot_token: &str,
        channel_id: &str,
        blocks: &serde_json::Value,
        fallback_text: &str,
    ) -> TransportResult<()> {
        self.accept(SentMessage {
            operation: "channel_blocks",
            bot_token: bot_token.to_string(),
            channel_id: channel_id.to_string(),
            user_id: None,
            text: fallback_text.to_string(),
            blocks: Some(blocks.clone()),
        })
    }

    async fn send_ephemeral_text(
        &self,
        bot_token: &str,
        channel_id: &str,
        user_id: &str,
        text: &str,
    ) -> TransportResult<()> {
        self.accept(SentMessage {
            operation: "ephemeral_text",
            bot_token: bot_token.to_string(),
            channel_id: channel_id.to_string(),
            user_id: Some(user_id.to_string()),
            text: text.to_string(),
            blocks: None,
        })
    }

    async fn send_ephemeral_blocks(
        &self,
        bot_token: &str,
        channel_id: &str,
        user_id: &str,
        blocks: &serde_json::Value,
        fallback_text: &str,
    ) -> TransportResult<()> {
        self.accept(SentMessage {
            operation: "ephemeral_blocks",
            bot_token: bot_token.to_string(),
            channel_id: channel_id.to_string(),
            user_id: Some(user_id.to_string()),
            text: fallback_text.to_string(),
            blocks: Some(blocks.clone()),
        })
    }
}

/// Scripted failure mode for [`TestHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    Transient,
    Invariant,
}

impl FailureMode {
    fn into_error(self) -> HandlerError {
        match self {
            Self::Transient => HandlerError::Transient("scripted transient failure".to_string()),
            Self::Invariant => HandlerError::Invariant("scripted invariant failure".to_string()),
        }
    }
}

/// Business handler with a scripted failure sequence.
///
/// Each invocation first performs the configured outbox write (when set),
/// then pops the next failure mode; with the script exhausted it either
/// repeats `repeat` forever or succeeds.
pub struct TestHandler {
    invocations: AtomicU32,
    script: Mutex<VecDeque<FailureMode>>,
    repeat: Option<FailureMode>,
    notify: Option<(OutboxWriter, NewOutboxMessage)>,
}

impl TestHandler {
    /// Always succeeds.
    pub fn ok() -> Arc<Self> {
        Arc::new(Self {
            invocations: AtomicU32::new(0),
            script: Mutex::new(VecDeque::new()),
            repeat: None,
            notify: None,
        })
    }

    /// Fails with `script` in order, then succeeds.
    pub fn failing(script: Vec<FailureMode>) -> Arc<Self> {
        Arc::new(Self {
            invocations: AtomicU32::new(0),
            script: Mutex::new(script.into()),
            repeat: None,
            notify: None,
        })
    }

    /// Fails with `mode` on every invocation.
    pub fn failing_forever(mode: FailureMode) -> Arc<Self> {
        Arc::new(Self {
            invocations: AtomicU32::new(0),
            script: Mutex::new(VecDeque::new()),
            repeat: Some(mode),
            notify: None,
        })
    }

    /// Writes `message` to the outbox on every invocation, then succeeds.
    pub fn notifying(writer: OutboxWriter, message: NewOutboxMessage) -> Arc<Self> {
        Arc::new(Self {
            invocations: AtomicU32::new(0),
            script: Mutex::new(VecDeque::new()),
            repeat: None,
            notify: Some((writer, message)),
        })
    }

    /// Writes `message` on every invocation, failing per `script` first.
    pub fn notifying_flaky(
        writer: OutboxWriter,
        message: NewOutboxMessage,
        script: Vec<FailureMode>,
    ) -> Arc<Self> {
        Arc::new(Self {
            invocations: AtomicU32::new(0),
            script: Mutex::new(script.into()),
            repeat: None,
            notify: Some((writer, message)),
        })
    }

    pub fn invocations(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InboxHandler for TestHandler {
    async fn handle(&self, _entry: &InboxEntry) -> HandlerResult<()> {
        self.invocations.fetch_add(1, Ordering::SeqCst);

        if let Some((writer, message)) = &self.notify {
            writer.enqueue(message.clone()).await?;
        }

        let mode = self.script.lock().unwrap().pop_front().or(self.repeat);
        match mode {
            Some(mode) => Err(mode.into_error()),
            None => Ok(()),
        }
    }
}

/// Engine over an in-memory database plus its mock transport.
pub struct TestEngine {
    pub engine: DeliveryEngine,
    pub transport: Arc<MockTransport>,
}

/// Fresh in-memory database. Use with [`engine_on`] when a handler needs an
/// [`OutboxWriter`] wired to the same database before the engine exists.
pub async fn open_db() -> Database {
    Database::open_in_memory().await.unwrap()
}

/// Build an engine over an existing database.
pub fn engine_on(db: Database, handlers: HandlerRegistry, config: EngineConfig) -> TestEngine {
    let transport = MockTransport::new();
    let engine = DeliveryEngine::new(db, handlers, transport.clone(), config);
    TestEngine { engine, transport }
}

/// Build an engine with the given registry and config.
pub async fn engine_with(handlers: HandlerRegistry, config: EngineConfig) -> TestEngine {
    engine_on(open_db().await, handlers, config)
}

/// Config for deterministic tests: triggering off, tight backoff.
pub fn manual_config() -> EngineConfig {
    EngineConfig {
        trigger: TriggerConfig { enabled: false },
        retry: RetryPolicy {
            max_attempts: 5,
            in_call_attempts: 1,
            backoff: fast_backoff(),
        },
        ..EngineConfig::default()
    }
}

pub fn fast_backoff() -> BackoffPolicy {
    BackoffPolicy {
        initial: Duration::from_millis(1),
        multiplier: 2.0,
        max: Duration::from_millis(5),
    }
}

/// A fast polling worker config for tests that run the real workers.
pub fn fast_worker() -> WorkerConfig {
    WorkerConfig {
        enabled: true,
        poll_delay: Duration::from_millis(10),
        batch_size: 10,
    }
}

/// A channel-text notification to `C123`.
pub fn channel_text_message(text: &str) -> NewOutboxMessage {
    NewOutboxMessage {
        message_kind: OutboxMessageKind::ChannelText,
        target: DeliveryTarget {
            bot_token: "xoxb-test".to_string(),
            channel_id: "C123".to_string(),
            user_id: None,
        },
        content: MessageContent::Text(text.to_string()),
    }
}

/// Wait until `probe` returns true, or panic after ~2 seconds.
pub async fn wait_until<F, Fut>(mut probe: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if probe().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached within 2s");
}

/// Registry with one handler on `BlockAction`.
pub fn registry_with(handler: Arc<TestHandler>) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(InboxKind::BlockAction, handler);
    registry
}
