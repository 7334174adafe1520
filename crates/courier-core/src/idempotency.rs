//! Deterministic idempotency keys.
//!
//! A key is the SHA-256 hex digest of `scope + ":" + canonical_payload`.
//! Identical logical events always hash to the identical key; distinct
//! events collide only with cryptographic-hash-negligible probability.

use sha2::{Digest, Sha256};

/// Separator between canonical payload components.
const COMPONENT_SEPARATOR: &str = "|";

/// Scope under which outbox notification keys are generated.
const OUTBOX_SCOPE: &str = "outbox";

/// Generate an idempotency key from a scope and a canonical payload.
///
/// Pure and deterministic: byte-identical input yields byte-identical
/// output.
pub fn generate(scope: &str, canonical_payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(scope.as_bytes());
    hasher.update(b":");
    hasher.update(canonical_payload.as_bytes());
    hex::encode(hasher.finalize())
}

/// Build a canonical payload from components.
///
/// Each component is length-prefixed (`len#value`, length in bytes) before
/// joining, so ambiguous concatenations (`"ab" + "c"` vs `"a" + "bc"`)
/// cannot produce the same payload.
pub fn canonical_payload<S: AsRef<str>>(components: &[S]) -> String {
    components
        .iter()
        .map(|c| {
            let v = c.as_ref();
            format!("{}#{}", v.len(), v)
        })
        .collect::<Vec<_>>()
        .join(COMPONENT_SEPARATOR)
}

/// Derive the idempotency key for an outbox notification.
///
/// The key is a function of the causal source, the message kind, and the
/// delivery target, never of wall-clock time, so re-executing the same
/// handler for the same cause collapses to one outbox row. An absent user
/// component is coerced to the empty string.
pub fn outbox_key(
    source_key: &str,
    message_kind: &str,
    channel_id: &str,
    user_id: Option<&str>,
) -> String {
    let payload = canonical_payload(&[
        source_key,
        message_kind,
        channel_id,
        user_id.unwrap_or_default(),
    ]);
    generate(OUTBOX_SCOPE, &payload)
}
