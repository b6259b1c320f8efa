//! Canonical state types shared by the sync components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use switchboard_http::{ConversationRecord, ConversationStatus, Direction, MessageRecord};
use uuid::Uuid;

/// Where an engine input came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Snapshot,
    Push,
    Optimistic,
}

/// The canonical list a change applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum Channel {
    Roster,
    Conversation(u64),
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Roster => f.write_str("roster"),
            Channel::Conversation(id) => write!(f, "conversation:{}", id),
        }
    }
}

/// A roster entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: u64,
    pub contact_id: Option<u64>,
    pub status: ConversationStatus,
    pub assignee_id: Option<u64>,
    pub last_message_id: Option<u64>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ConversationSummary {
    pub fn from_record(record: &ConversationRecord) -> Self {
        Self {
            id: record.id,
            contact_id: record.contact_id,
            status: record.status.unwrap_or_default(),
            assignee_id: record.assignee_id.flatten(),
            last_message_id: record.last_message_id,
            updated_at: record.updated_at,
        }
    }

    /// Overlay the fields a partial record carries.
    pub fn patch(&mut self, record: &ConversationRecord) {
        if record.contact_id.is_some() {
            self.contact_id = record.contact_id;
        }
        if let Some(status) = record.status {
            self.status = status;
        }
        if let Some(assignee) = record.assignee_id {
            self.assignee_id = assignee;
        }
        if record.last_message_id.is_some() {
            self.last_message_id = record.last_message_id;
        }
        if record.updated_at.is_some() {
            self.updated_at = record.updated_at;
        }
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_closed()
    }
}

/// A message in a conversation's canonical list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Option<u64>,
    pub conversation_id: u64,
    pub direction: Direction,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Locally created, not yet confirmed by an id.
    pub transient: bool,
    pub client_key: Option<Uuid>,
}

impl Message {
    pub fn from_record(record: &MessageRecord) -> Self {
        Self {
            id: record.id,
            conversation_id: record.conversation_id,
            direction: record.direction(),
            content: record.content.clone(),
            created_at: record.created_at,
            transient: record.id.is_none(),
            client_key: None,
        }
    }

    /// The local placeholder for an outgoing send.
    pub fn optimistic(
        conversation_id: u64,
        content: impl Into<String>,
        client_key: Uuid,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            conversation_id,
            direction: Direction::Agent,
            content: content.into(),
            created_at,
            transient: true,
            client_key: Some(client_key),
        }
    }

    /// Dedup identity: same direction and same normalized content.
    pub fn same_content(&self, other: &Message) -> bool {
        self.direction == other.direction
            && normalize_content(&self.content) == normalize_content(&other.content)
    }
}

/// Trim and collapse inner whitespace runs to a single space.
pub fn normalize_content(content: &str) -> String {
    content.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingStatus {
    Pending,
    Confirmed,
    Failed,
}

/// An in-flight user send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingSend {
    pub client_key: Uuid,
    pub conversation_id: u64,
    pub content: String,
    pub submitted_at: DateTime<Utc>,
    pub status: PendingStatus,
    /// The acknowledgement timeout fired before any response or echo.
    pub stalled: bool,
    /// Failure reason, kept so the caller can show it next to a retry.
    pub error: Option<String>,
}

impl PendingSend {
    pub fn new(client_key: Uuid, conversation_id: u64, content: String) -> Self {
        Self {
            client_key,
            conversation_id,
            content,
            submitted_at: Utc::now(),
            status: PendingStatus::Pending,
            stalled: false,
            error: None,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.status != PendingStatus::Pending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connecting,
    Open,
    Closed,
    Reconnecting,
}

/// Per-scope connection health, for a connecting/online/offline indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub retry_count: u32,
    pub last_error: Option<String>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            retry_count: 0,
            last_error: None,
        }
    }
}

impl ConnectionState {
    pub fn is_online(&self) -> bool {
        self.status == ConnectionStatus::Open
    }
}
