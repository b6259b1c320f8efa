use serde::{Deserialize, Serialize};
use std::fmt;

/// The addressable target of a push connection or a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum Scope {
    /// A single conversation's channel.
    Conversation(u64),
    /// The tenant-wide dashboard channel of an account.
    Tenant(u64),
}

impl Scope {
    /// Channel name used in push URLs.
    pub fn channel_key(&self) -> String {
        match self {
            Scope::Conversation(id) => format!("conversation:{}", id),
            Scope::Tenant(id) => format!("account:{}", id),
        }
    }

    pub fn conversation_id(&self) -> Option<u64> {
        match self {
            Scope::Conversation(id) => Some(*id),
            Scope::Tenant(_) => None,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.channel_key())
    }
}
