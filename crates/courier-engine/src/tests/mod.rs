//! Integration tests for the delivery engine.
//!
//! - `harness.rs`     - Mock transport, scripted handlers, engine fixture
//! - `enqueue.rs`     - Idempotent enqueue
//! - `claiming.rs`    - Atomic claim under concurrency
//! - `transitions.rs` - State machine guards
//! - `retry.rs`       - In-call retry, retry budget, permanent failures
//! - `recovery.rs`    - Abandoned-claim reclamation
//! - `correlation.rs` - Causal idempotency of outbox writes
//! - `end_to_end.rs`  - Inbox to handler to outbox to transport
//! - `workers.rs`     - Polling workers and the immediate trigger

mod correlation;
pub(crate) mod harness;
