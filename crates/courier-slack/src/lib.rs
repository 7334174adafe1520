//! Slack transport for the courier delivery engine.
//!
//! This crate provides:
//! - [`ChatTransport`]: the four-operation seam the outbox drains into
//! - [`SlackClient`]: a reqwest-based Web API implementation
//! - [`TransportError`]: failure-kind-aware errors the retry classifier
//!   understands

mod client;
mod error;
mod slack;

pub use client::ChatTransport;
pub use error::{TransportError, TransportResult};
pub use slack::{SlackClient, SlackConfig};
