//! Scheduled polling workers.
//!
//! Polling is the delivery guarantee: the immediate trigger is best-effort,
//! but every enqueued row is eventually reached by a poll. Each run catches
//! and logs its own failure so one poisoned row or a storage outage cannot
//! stop future runs.

use std::sync::Arc;

use courier_database::InboxKind;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{InboxProcessor, OutboxProcessor, WorkerConfig};

pub(crate) fn spawn_inbox_worker(
    processor: Arc<InboxProcessor>,
    kind: InboxKind,
    config: WorkerConfig,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let worker = format!("inbox-{}-{}", kind.as_str(), Uuid::new_v4());
    tokio::spawn(async move {
        let mut ticker = interval(config.poll_delay);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(worker = %worker, "Polling worker started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    match processor.process_pending(kind, config.batch_size).await {
                        Ok(report) if report.claimed > 0 => {
                            debug!(
                                worker = %worker,
                                claimed = report.claimed,
                                succeeded = report.succeeded,
                                retried = report.retried,
                                failed = report.failed,
                                "Inbox poll finished"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(worker = %worker, error = %e, "Inbox poll failed; next run continues");
                        }
                    }
                }
            }
        }

        info!(worker = %worker, "Polling worker stopped");
    })
}

pub(crate) fn spawn_outbox_worker(
    processor: Arc<OutboxProcessor>,
    config: WorkerConfig,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let worker = format!("outbox-{}", Uuid::new_v4());
    tokio::spawn(async move {
        let mut ticker = interval(config.poll_delay);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(worker = %worker, "Polling worker started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    match processor.process_pending(config.batch_size).await {
                        Ok(report) if report.claimed > 0 => {
                            debug!(
                                worker = %worker,
                                claimed = report.claimed,
                                succeeded = report.succeeded,
                                retried = report.retried,
                                failed = report.failed,
                                "Outbox poll finished"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(worker = %worker, error = %e, "Outbox poll failed; next run continues");
                        }
                    }
                }
            }
        }

        info!(worker = %worker, "Polling worker stopped");
    })
}
