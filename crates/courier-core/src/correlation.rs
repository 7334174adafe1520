//! Task-scoped source correlation.
//!
//! A handler invoked while processing an inbox entry may enqueue outbox
//! writes. If the inbox entry is retried the handler re-executes, and the
//! second execution must not produce a second outbox row for the same
//! logical notification. Outbox idempotency keys are therefore derived from
//! the *causal source* of the write, which this module binds to the current
//! task while the handler runs.
//!
//! The binding is a `tokio::task_local!` value: concurrent tasks each see
//! their own binding, and entering a nested scope restores the outer value
//! on exit. There is no shared mutable global.

use std::future::Future;

use thiserror::Error;

tokio::task_local! {
    static SOURCE_KEY: String;
}

/// Prefix for sources rooted at an inbox entry.
const INBOX_PREFIX: &str = "INBOX";

/// Prefix for sources rooted at a business event outside the inbox.
const BUSINESS_PREFIX: &str = "BUSINESS";

/// Error raised when an outbox write is attempted with no causal binding.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SourceBindingError {
    /// A write with no bound source is a latent duplicate-notification bug,
    /// so it fails loudly instead of falling back to a degenerate key.
    #[error(
        "no delivery source bound to the current task; \
         wrap the call in with_inbox_source or with_business_event_source"
    )]
    Unbound,
}

/// Run `fut` with the ambient source key bound to the given inbox entry.
pub async fn with_inbox_source<F>(inbox_id: i64, fut: F) -> F::Output
where
    F: Future,
{
    SOURCE_KEY
        .scope(format!("{INBOX_PREFIX}:{inbox_id}"), fut)
        .await
}

/// Run `fut` with the ambient source key bound to a business event.
pub async fn with_business_event_source<F>(event_id: &str, fut: F) -> F::Output
where
    F: Future,
{
    SOURCE_KEY
        .scope(format!("{BUSINESS_PREFIX}:{event_id}"), fut)
        .await
}

/// Read the ambient source key for the current task.
///
/// Errors when no scope is active.
pub fn require_source_key() -> Result<String, SourceBindingError> {
    SOURCE_KEY
        .try_with(|key| key.clone())
        .map_err(|_| SourceBindingError::Unbound)
}
