//! Courier delivery engine.
//!
//! The inbox/outbox pattern for event-driven side effects: incoming
//! interaction events and outgoing notifications are durably recorded
//! before anything acts on them, then drained by concurrent workers with
//! idempotent enqueue, atomic claim semantics, bounded retry, and crash
//! recovery. The guarantee is at-least-once delivery plus producer-side
//! deduplication: an event handler that both mutates state and triggers a
//! notification survives crashes, concurrent workers, and retries without
//! double-sending.
//!
//! ```text
//! submit ──▶ inbox ──claim──▶ InboxProcessor ──▶ handler
//!                                  │                 │ OutboxWriter
//!                                  ▼                 ▼
//!                             processed           outbox ──claim──▶ OutboxProcessor ──▶ transport
//! ```
//!
//! Polling workers are the correctness backstop; the immediate trigger is
//! a latency optimization layered on top. The recovery scanner reclaims
//! rows whose worker died mid-processing.

mod config;
mod engine;
mod error;
mod handler;
mod inbox;
mod outbox;
mod recovery;
mod retry_call;
mod trigger;
mod worker;

#[cfg(test)]
mod tests;

pub use config::{EngineConfig, RecoveryConfig, RetryPolicy, TriggerConfig, WorkerConfig};
pub use engine::DeliveryEngine;
pub use error::{EngineError, EngineResult};
pub use handler::{HandlerError, HandlerRegistry, HandlerResult, InboxHandler};
pub use inbox::{InboxProcessor, ProcessReport};
pub use outbox::{OutboxProcessor, OutboxWriter};
pub use recovery::{RecoveryReport, RecoveryScanner};
pub use trigger::ImmediateTrigger;
