//! Wire records returned by the snapshot endpoints and carried by push events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Customer,
    Agent,
    Bot,
}

/// Lifecycle status of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Open,
    Pending,
    Snoozed,
    Resolved,
    Closed,
    #[serde(other)]
    Other,
}

impl ConversationStatus {
    /// Closed-class conversations drop out of the active roster.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, ConversationStatus::Resolved | ConversationStatus::Closed)
    }
}

impl Default for ConversationStatus {
    fn default() -> Self {
        ConversationStatus::Open
    }
}

/// A message as the server reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    #[serde(default)]
    pub id: Option<u64>,
    pub conversation_id: u64,
    #[serde(with = "crate::types::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
    #[serde(default)]
    pub is_from_customer: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_type: Option<String>,
}

impl MessageRecord {
    pub fn direction(&self) -> Direction {
        if self.is_from_customer {
            return Direction::Customer;
        }
        match self.sender_type.as_deref() {
            Some(kind) if kind.eq_ignore_ascii_case("bot") => Direction::Bot,
            _ => Direction::Agent,
        }
    }
}

/// A conversation as the server reports it.
///
/// Snapshot listings carry every field; push events may carry only the id and
/// the fields that changed, so everything else is optional. `assignee_id` is
/// doubly optional: absent means "unchanged", `null` means "unassigned".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ConversationStatus>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub assignee_id: Option<Option<u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_id: Option<u64>,
    #[serde(
        default,
        with = "crate::types::timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn double_option<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Option<u64>>, D::Error> {
    Option::<u64>::deserialize(deserializer).map(Some)
}
