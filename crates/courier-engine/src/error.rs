//! Engine error types.

use courier_core::SourceBindingError;
use courier_database::DatabaseError;
use courier_slack::TransportError;
use thiserror::Error;

/// Engine error type.
///
/// Errors of this type are fatal to the operation that raised them; the
/// expected failure modes (duplicate enqueue, lost claim race, transient
/// handler failure) never surface here, being return values or persisted
/// queue states instead.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Missing source correlation binding
    #[error(transparent)]
    SourceBinding(#[from] SourceBindingError),

    /// No handler registered for an inbox kind
    #[error("no handler registered for inbox kind '{0}'")]
    NoHandler(&'static str),

    /// A handler failure escalated out of the processor
    #[error("handler failure escalated: {0}")]
    Handler(String),
}

/// Result type alias using EngineError.
pub type EngineResult<T> = Result<T, EngineError>;
