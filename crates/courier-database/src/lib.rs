//! SQLite persistence for the courier inbox/outbox queues.
//!
//! This crate provides:
//! - An async SQLite executor on a dedicated thread ([`Database`])
//! - Versioned migrations for the queue schema
//! - Model types and status enums for both queues
//! - Standalone query functions implementing the claim state machine
//! - [`InboxStore`] / [`OutboxStore`] wrappers used by the processors
//!
//! All cross-worker coordination happens through the row set: the claim is a
//! single conditional UPDATE, so at most one claimant wins per row no matter
//! how many workers poll concurrently.

mod error;
mod executor;
mod inbox;
pub mod migrations;
mod models;
mod outbox;
pub mod queries;

pub use error::{DatabaseError, DatabaseResult};
pub use executor::Database;
pub use inbox::InboxStore;
pub use models::*;
pub use outbox::OutboxStore;
