//! Queue model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum length of a persisted failure reason, in bytes.
pub const MAX_FAILURE_REASON_LEN: usize = 500;

/// Incoming interaction event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboxKind {
    BlockAction,
    ViewSubmission,
}

impl InboxKind {
    /// All kinds, in claim-scan order. Recovery iterates over this.
    pub const ALL: [InboxKind; 2] = [InboxKind::BlockAction, InboxKind::ViewSubmission];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BlockAction => "block_action",
            Self::ViewSubmission => "view_submission",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "view_submission" => Self::ViewSubmission,
            _ => Self::BlockAction,
        }
    }
}

/// Inbox entry status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboxStatus {
    Pending,
    Processing,
    Processed,
    RetryPending,
    Failed,
}

impl Default for InboxStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl InboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::RetryPending => "retry_pending",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "processing" => Self::Processing,
            "processed" => Self::Processed,
            "retry_pending" => Self::RetryPending,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// Outbox entry status. Terminal success is `Sent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Processing,
    Sent,
    RetryPending,
    Failed,
}

impl Default for OutboxStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Sent => "sent",
            Self::RetryPending => "retry_pending",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "processing" => Self::Processing,
            "sent" => Self::Sent,
            "retry_pending" => Self::RetryPending,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// Why an entry ended up `Failed`. Set only on failed rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A business rule rejected the work; retrying cannot succeed.
    BusinessInvariant,
    /// The configured attempt budget ran out on a transient failure.
    RetryExhausted,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BusinessInvariant => "business_invariant",
            Self::RetryExhausted => "retry_exhausted",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "retry_exhausted" => Self::RetryExhausted,
            _ => Self::BusinessInvariant,
        }
    }
}

/// Outgoing notification kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxMessageKind {
    EphemeralText,
    EphemeralBlocks,
    ChannelText,
    ChannelBlocks,
}

impl OutboxMessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EphemeralText => "ephemeral_text",
            Self::EphemeralBlocks => "ephemeral_blocks",
            Self::ChannelText => "channel_text",
            Self::ChannelBlocks => "channel_blocks",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "ephemeral_text" => Self::EphemeralText,
            "ephemeral_blocks" => Self::EphemeralBlocks,
            "channel_blocks" => Self::ChannelBlocks,
            _ => Self::ChannelText,
        }
    }
}

/// Where a notification goes: workspace bearer token, channel, and (for
/// ephemeral sends) the target user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryTarget {
    pub bot_token: String,
    pub channel_id: String,
    pub user_id: Option<String>,
}

/// What a notification says: plain text, or a block tree with fallback text
/// for surfaces that cannot render blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageContent {
    Text(String),
    Blocks {
        blocks: serde_json::Value,
        fallback_text: String,
    },
}

/// Inbox entry: one durably recorded incoming event.
#[derive(Debug, Clone)]
pub struct InboxEntry {
    pub id: i64,
    pub kind: InboxKind,
    pub idempotency_key: String,
    /// Opaque event body, stored and replayed verbatim.
    pub payload: String,
    pub status: InboxStatus,
    pub processing_attempt: i32,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub failure_kind: Option<FailureKind>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outbox entry: one durably recorded outgoing notification.
#[derive(Debug, Clone)]
pub struct OutboxEntry {
    pub id: i64,
    pub message_kind: OutboxMessageKind,
    pub idempotency_key: String,
    pub target: DeliveryTarget,
    pub content: MessageContent,
    pub status: OutboxStatus,
    pub processing_attempt: i32,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub failure_kind: Option<FailureKind>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New inbox event for insertion.
#[derive(Debug, Clone)]
pub struct NewInboxEvent {
    pub kind: InboxKind,
    pub idempotency_key: String,
    pub payload: String,
}

/// New outbox notification for insertion. The idempotency key is derived by
/// the producer from the causal source (see `courier-engine`), not part of
/// this struct.
#[derive(Debug, Clone)]
pub struct NewOutboxMessage {
    pub message_kind: OutboxMessageKind,
    pub target: DeliveryTarget,
    pub content: MessageContent,
}

/// Row counts by status for one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: u64,
    pub processing: u64,
    /// `processed` rows for the inbox, `sent` rows for the outbox.
    pub succeeded: u64,
    pub retry_pending: u64,
    pub failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbox_status_round_trips() {
        for status in [
            InboxStatus::Pending,
            InboxStatus::Processing,
            InboxStatus::Processed,
            InboxStatus::RetryPending,
            InboxStatus::Failed,
        ] {
            assert_eq!(InboxStatus::from_str(status.as_str()), status);
        }
        // Unknown defaults to Pending.
        assert_eq!(InboxStatus::from_str("bogus"), InboxStatus::Pending);
    }

    #[test]
    fn outbox_status_round_trips() {
        for status in [
            OutboxStatus::Pending,
            OutboxStatus::Processing,
            OutboxStatus::Sent,
            OutboxStatus::RetryPending,
            OutboxStatus::Failed,
        ] {
            assert_eq!(OutboxStatus::from_str(status.as_str()), status);
        }
        assert_eq!(OutboxStatus::from_str(""), OutboxStatus::Pending);
    }

    #[test]
    fn message_kind_round_trips() {
        for kind in [
            OutboxMessageKind::EphemeralText,
            OutboxMessageKind::EphemeralBlocks,
            OutboxMessageKind::ChannelText,
            OutboxMessageKind::ChannelBlocks,
        ] {
            assert_eq!(OutboxMessageKind::from_str(kind.as_str()), kind);
        }
    }

    #[test]
    fn inbox_kind_round_trips() {
        for kind in InboxKind::ALL {
            assert_eq!(InboxKind::from_str(kind.as_str()), kind);
        }
    }

    #[test]
    fn failure_kind_round_trips() {
        assert_eq!(
            FailureKind::from_str(FailureKind::BusinessInvariant.as_str()),
            FailureKind::BusinessInvariant
        );
        assert_eq!(
            FailureKind::from_str(FailureKind::RetryExhausted.as_str()),
            FailureKind::RetryExhausted
        );
    }
}
