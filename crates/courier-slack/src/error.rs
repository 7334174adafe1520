//! Transport error types.

use courier_core::{Classify, FailureClass};
use thiserror::Error;

/// Transport error type.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The request did not complete within the configured timeout.
    #[error("chat API request timed out")]
    Timeout,

    /// Connectivity failure before a response arrived.
    #[error("network failure talking to chat API: {0}")]
    Network(String),

    /// The platform asked us to slow down (HTTP 429 or `ratelimited`).
    #[error("rate limited by chat API")]
    RateLimited {
        /// Seconds the platform asked us to wait, when it said.
        retry_after_secs: Option<u64>,
    },

    /// The platform rejected the request (`ok: false` or an error status).
    /// Retrying the same payload cannot succeed.
    #[error("chat API rejected the request: {0}")]
    Api(String),

    /// The payload cannot be serialized for the wire.
    #[error("malformed transport payload: {0}")]
    InvalidPayload(String),
}

impl Classify for TransportError {
    fn failure_class(&self) -> FailureClass {
        match self {
            Self::Timeout => FailureClass::Timeout,
            Self::Network(_) => FailureClass::Network,
            Self::RateLimited { .. } => FailureClass::RateLimited,
            Self::Api(_) | Self::InvalidPayload(_) => FailureClass::Invariant,
        }
    }
}

/// Result type alias using TransportError.
pub type TransportResult<T> = Result<T, TransportError>;
