//! Core building blocks for the courier delivery engine.
//!
//! This crate provides the leaf utilities shared by the stores and
//! processors:
//! - Idempotency key generation (deterministic event fingerprints)
//! - Source correlation (task-scoped causal binding for outbox writes)
//! - Failure classification and backoff computation
//! - Tracing initialization

pub mod correlation;
pub mod idempotency;
mod logging;
pub mod retry;

pub use correlation::SourceBindingError;
pub use logging::init_logging;
pub use retry::{compute_backoff, is_retryable, jittered, BackoffPolicy, Classify, FailureClass};
