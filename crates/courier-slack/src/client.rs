//! The outbound transport seam.

use async_trait::async_trait;

use crate::TransportResult;

/// The four delivery operations the outbox drains into.
///
/// Contract: a method returns `Ok(())` when the platform accepted the
/// message and an error otherwise; nothing more is assumed. Implementors
/// must be safe to call from concurrent workers.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Post plain text to a channel.
    async fn send_channel_text(
        &self,
        bot_token: &str,
        channel_id: &str,
        text: &str,
    ) -> TransportResult<()>;

    /// Post a block tree to a channel, with fallback text for surfaces that
    /// cannot render blocks.
    async fn send_channel_blocks(
        &self,
        bot_token: &str,
        channel_id: &str,
        blocks: &serde_json::Value,
        fallback_text: &str,
    ) -> TransportResult<()>;

    /// Post plain text visible only to one user in a channel.
    async fn send_ephemeral_text(
        &self,
        bot_token: &str,
        channel_id: &str,
        user_id: &str,
        text: &str,
    ) -> TransportResult<()>;

    /// Post a block tree visible only to one user in a channel.
    async fn send_ephemeral_blocks(
        &self,
        bot_token: &str,
        channel_id: &str,
        user_id: &str,
        blocks: &serde_json::Value,
        fallback_text: &str,
    ) -> TransportResult<()>;
}
