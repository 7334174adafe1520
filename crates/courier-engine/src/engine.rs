//! Engine facade: wiring and lifecycle.

use std::sync::{Arc, Mutex};

use courier_database::{Database, InboxKind, InboxStore, NewOutboxMessage, OutboxStore};
use courier_slack::ChatTransport;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::recovery::spawn_recovery_worker;
use crate::worker::{spawn_inbox_worker, spawn_outbox_worker};
use crate::{
    EngineConfig, EngineResult, HandlerRegistry, ImmediateTrigger, InboxProcessor,
    OutboxProcessor, OutboxWriter, RecoveryScanner,
};

/// Owns the stores, processors, trigger, and background workers.
///
/// The facade is the embedding process's single entry point: webhook
/// plumbing calls [`submit`](Self::submit), business-event producers call
/// [`notify`](Self::notify) under a source scope, and
/// [`start`](Self::start)/[`shutdown`](Self::shutdown) manage the worker
/// fleet.
pub struct DeliveryEngine {
    inbox_store: InboxStore,
    outbox_store: OutboxStore,
    handlers: Arc<HandlerRegistry>,
    inbox_processor: Arc<InboxProcessor>,
    outbox_processor: Arc<OutboxProcessor>,
    scanner: Arc<RecoveryScanner>,
    trigger: ImmediateTrigger,
    writer: OutboxWriter,
    config: EngineConfig,
    shutdown_tx: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl DeliveryEngine {
    pub fn new(
        db: Database,
        handlers: HandlerRegistry,
        transport: Arc<dyn ChatTransport>,
        config: EngineConfig,
    ) -> Self {
        let inbox_store = InboxStore::new(db.clone());
        let outbox_store = OutboxStore::new(db);
        let handlers = Arc::new(handlers);

        let inbox_processor = Arc::new(InboxProcessor::new(
            inbox_store.clone(),
            handlers.clone(),
            config.retry.clone(),
        ));
        let outbox_processor = Arc::new(OutboxProcessor::new(
            outbox_store.clone(),
            transport,
            config.retry.clone(),
        ));
        let scanner = Arc::new(RecoveryScanner::new(
            inbox_store.clone(),
            outbox_store.clone(),
            config.recovery.clone(),
        ));
        let trigger = ImmediateTrigger::new(inbox_processor.clone(), outbox_processor.clone());
        let writer = OutboxWriter::new(outbox_store.clone());
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            inbox_store,
            outbox_store,
            handlers,
            inbox_processor,
            outbox_processor,
            scanner,
            trigger,
            writer,
            config,
            shutdown_tx,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Record an incoming event and, when triggering is enabled, kick the
    /// inbox processor for it.
    ///
    /// Returns `false` for a duplicate (the event was already recorded).
    /// The kick happens strictly after the insert has committed.
    pub async fn submit(
        &self,
        kind: InboxKind,
        idempotency_key: &str,
        payload: &str,
    ) -> EngineResult<bool> {
        let inserted = self
            .inbox_store
            .enqueue(kind, idempotency_key, payload)
            .await?;
        if inserted && self.config.trigger.enabled {
            self.trigger.fire_inbox(kind);
        }
        Ok(inserted)
    }

    /// Record a notification under the ambient causal source and, when
    /// triggering is enabled, kick the outbox processor.
    pub async fn notify(&self, message: NewOutboxMessage) -> EngineResult<bool> {
        let inserted = self.writer.enqueue(message).await?;
        if inserted && self.config.trigger.enabled {
            self.trigger.fire_outbox();
        }
        Ok(inserted)
    }

    /// The producer-side writer, for handlers that enqueue notifications.
    pub fn outbox_writer(&self) -> OutboxWriter {
        self.writer.clone()
    }

    pub fn inbox_store(&self) -> &InboxStore {
        &self.inbox_store
    }

    pub fn outbox_store(&self) -> &OutboxStore {
        &self.outbox_store
    }

    pub fn inbox_processor(&self) -> Arc<InboxProcessor> {
        self.inbox_processor.clone()
    }

    pub fn outbox_processor(&self) -> Arc<OutboxProcessor> {
        self.outbox_processor.clone()
    }

    pub fn recovery_scanner(&self) -> Arc<RecoveryScanner> {
        self.scanner.clone()
    }

    /// Spawn the enabled polling workers and the recovery scanner.
    /// Idempotent: a second call while running is a no-op.
    pub fn start(&self) {
        let mut workers = self.workers.lock().expect("lock poisoned");
        if !workers.is_empty() {
            return;
        }

        if self.config.inbox_worker.enabled {
            for kind in self.handlers.kinds() {
                workers.push(spawn_inbox_worker(
                    self.inbox_processor.clone(),
                    kind,
                    self.config.inbox_worker.clone(),
                    self.shutdown_tx.subscribe(),
                ));
            }
        }
        if self.config.outbox_worker.enabled {
            workers.push(spawn_outbox_worker(
                self.outbox_processor.clone(),
                self.config.outbox_worker.clone(),
                self.shutdown_tx.subscribe(),
            ));
        }
        workers.push(spawn_recovery_worker(
            self.scanner.clone(),
            self.shutdown_tx.subscribe(),
        ));

        info!(workers = workers.len(), "Delivery engine started");
    }

    /// Signal every worker to stop and wait for them to finish their
    /// current run.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handles: Vec<_> = {
            let mut workers = self.workers.lock().expect("lock poisoned");
            workers.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
        info!("Delivery engine stopped");
    }
}
