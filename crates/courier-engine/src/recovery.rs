//! Crash recovery for abandoned claims.
//!
//! A worker that claimed a row and died never finalizes it; the row sits in
//! `processing` forever. The scanner periodically moves such rows back to
//! `retry_pending` once their processing window exceeds the configured
//! timeout, making them claimable again. Timeouts are detected only
//! retrospectively here; nothing signals the stuck worker.

use std::sync::Arc;

use chrono::Utc;
use courier_database::{InboxKind, InboxStore, OutboxStore};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::{EngineResult, RecoveryConfig};

const RECOVERY_REASON: &str = "processing timed out; reclaimed by recovery scanner";

/// What one scan reclaimed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub inbox_recovered: u64,
    pub outbox_recovered: u64,
}

impl RecoveryReport {
    pub fn total(&self) -> u64 {
        self.inbox_recovered + self.outbox_recovered
    }
}

/// Reclaims rows stuck mid-processing after the configured timeout.
pub struct RecoveryScanner {
    inbox: InboxStore,
    outbox: OutboxStore,
    config: RecoveryConfig,
}

impl RecoveryScanner {
    pub fn new(inbox: InboxStore, outbox: OutboxStore, config: RecoveryConfig) -> Self {
        Self {
            inbox,
            outbox,
            config,
        }
    }

    /// Scan every queue once.
    pub async fn run_once(&self) -> EngineResult<RecoveryReport> {
        let now = Utc::now();
        let cutoff = now
            - chrono::Duration::from_std(self.config.processing_timeout)
                .unwrap_or_else(|_| chrono::Duration::seconds(300));

        let mut report = RecoveryReport::default();
        for kind in InboxKind::ALL {
            report.inbox_recovered += self
                .inbox
                .recover_timeout_processing(kind, cutoff, now, RECOVERY_REASON)
                .await?;
        }
        report.outbox_recovered = self
            .outbox
            .recover_timeout_processing(cutoff, now, RECOVERY_REASON)
            .await?;

        if report.total() > 0 {
            warn!(
                inbox_recovered = report.inbox_recovered,
                outbox_recovered = report.outbox_recovered,
                "Recovered abandoned processing rows"
            );
        }
        Ok(report)
    }
}

pub(crate) fn spawn_recovery_worker(
    scanner: Arc<RecoveryScanner>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(scanner.config.scan_delay);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Recovery scanner started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    if let Err(e) = scanner.run_once().await {
                        warn!(error = %e, "Recovery scan failed; next run continues");
                    }
                }
            }
        }

        info!("Recovery scanner stopped");
    })
}
