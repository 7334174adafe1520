//! Business handler seam and dispatch table.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use courier_core::{Classify, FailureClass, SourceBindingError};
use courier_database::{DatabaseError, InboxEntry, InboxKind};
use courier_slack::TransportError;
use thiserror::Error;

use crate::EngineError;

/// Failure of a business handler.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// A business rule rejected the event. The row fails permanently.
    #[error("business invariant violated: {0}")]
    Invariant(String),

    /// A self-declared transient failure worth retrying on a later poll.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Transport failure raised while the handler talked to the platform.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Persistence failure inside the handler.
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// Missing source correlation binding.
    #[error(transparent)]
    SourceBinding(#[from] SourceBindingError),

    /// An engine-level failure raised through the handler (e.g. from an
    /// outbox write).
    #[error(transparent)]
    Engine(Box<EngineError>),
}

impl From<EngineError> for HandlerError {
    fn from(e: EngineError) -> Self {
        Self::Engine(Box::new(e))
    }
}

impl Classify for HandlerError {
    fn failure_class(&self) -> FailureClass {
        match self {
            Self::Invariant(_) => FailureClass::Invariant,
            // Self-declared transient failures share the transient network
            // class.
            Self::Transient(_) => FailureClass::Network,
            Self::Transport(e) => e.failure_class(),
            Self::Database(DatabaseError::IllegalTransition(_)) => FailureClass::Contract,
            Self::Database(_) => FailureClass::Internal,
            Self::SourceBinding(_) => FailureClass::Contract,
            Self::Engine(e) => e.failure_class(),
        }
    }
}

impl Classify for EngineError {
    fn failure_class(&self) -> FailureClass {
        match self {
            EngineError::Database(DatabaseError::IllegalTransition(_)) => FailureClass::Contract,
            EngineError::Database(_) => FailureClass::Internal,
            EngineError::Transport(e) => e.failure_class(),
            EngineError::SourceBinding(_) => FailureClass::Contract,
            EngineError::NoHandler(_) => FailureClass::Contract,
            EngineError::Handler(_) => FailureClass::Internal,
        }
    }
}

impl HandlerError {
    /// Escalate a contract-class failure out of the processor. Contract
    /// violations are never persisted as queue states.
    pub(crate) fn into_engine(self) -> EngineError {
        match self {
            Self::Database(e) => EngineError::Database(e),
            Self::SourceBinding(e) => EngineError::SourceBinding(e),
            Self::Transport(e) => EngineError::Transport(e),
            Self::Engine(e) => *e,
            other => EngineError::Handler(other.to_string()),
        }
    }
}

/// Result type alias using HandlerError.
pub type HandlerResult<T> = Result<T, HandlerError>;

/// A business handler for one inbox kind.
///
/// The handler receives the entry with its payload replayed verbatim. It
/// may be re-executed after crash recovery, so its side effects must be
/// idempotent. Outbox writes are, because their keys derive from the
/// bound source.
#[async_trait]
pub trait InboxHandler: Send + Sync {
    async fn handle(&self, entry: &InboxEntry) -> HandlerResult<()>;
}

/// Strategy table mapping inbox kinds to their handlers.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<InboxKind, Arc<dyn InboxHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for `kind`, replacing any previous one.
    pub fn register(&mut self, kind: InboxKind, handler: Arc<dyn InboxHandler>) {
        self.handlers.insert(kind, handler);
    }

    pub fn get(&self, kind: InboxKind) -> Option<Arc<dyn InboxHandler>> {
        self.handlers.get(&kind).cloned()
    }

    /// Kinds with a registered handler. The engine polls only these.
    pub fn kinds(&self) -> Vec<InboxKind> {
        self.handlers.keys().copied().collect()
    }
}
