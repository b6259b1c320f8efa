//! Push envelope parsing.
//!
//! Every push frame is a JSON object `{ "type": ..., ...payload }` with the
//! payload fields spread next to `type`. Unrecognized types parse into
//! [`PushEvent::Unknown`] so callers can ignore them without failing.

use crate::error::{Result, TransportError};
use crate::types::{ConversationRecord, MessageRecord};
use serde_json::Value;

/// A raw frame read off a push connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Closed { code: u16, reason: String },
}

impl Frame {
    /// Close code for a normal, intentional shutdown.
    pub const NORMAL_CLOSE: u16 = 1000;
    /// Close code when the peer vanished without a close frame.
    pub const ABNORMAL_CLOSE: u16 = 1006;

    pub fn closed(code: u16, reason: impl Into<String>) -> Self {
        Frame::Closed {
            code,
            reason: reason.into(),
        }
    }
}

/// A decoded push event.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// `conversation.created`, `conversation.updated`,
    /// `conversation.status_changed`, `assignee.changed`
    Conversation {
        kind: String,
        record: ConversationRecord,
    },
    /// `message.created`, `message.updated`
    Message { kind: String, record: MessageRecord },
    Ping,
    Welcome,
    Unknown(String),
}

impl PushEvent {
    /// Conversation this event refers to, if any.
    pub fn conversation_id(&self) -> Option<u64> {
        match self {
            PushEvent::Conversation { record, .. } => Some(record.id),
            PushEvent::Message { record, .. } => Some(record.conversation_id),
            _ => None,
        }
    }

    /// Keep-alive and handshake frames carry no state.
    pub fn is_control(&self) -> bool {
        matches!(self, PushEvent::Ping | PushEvent::Welcome)
    }
}

/// Parse one push frame into a typed event.
pub fn parse_envelope(text: &str) -> Result<PushEvent> {
    let value: Value = serde_json::from_str(text)?;
    let Some(object) = value.as_object() else {
        return Err(TransportError::Malformed(
            "push envelope is not a JSON object".to_string(),
        ));
    };
    let kind = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| TransportError::Malformed("push envelope has no type".to_string()))?
        .to_string();

    let event = match kind.as_str() {
        "ping" => PushEvent::Ping,
        "welcome" => PushEvent::Welcome,
        "conversation.created"
        | "conversation.updated"
        | "conversation.status_changed"
        | "assignee.changed" => {
            let record: ConversationRecord = serde_json::from_value(value)?;
            PushEvent::Conversation { kind, record }
        }
        "message.created" | "message.updated" => {
            let record: MessageRecord = serde_json::from_value(value)?;
            PushEvent::Message { kind, record }
        }
        _ => PushEvent::Unknown(kind),
    };
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConversationStatus;

    #[test]
    fn test_message_created() {
        let event = parse_envelope(
            r#"{"type":"message.created","id":55,"conversation_id":7,"created_at":1700000000,"content":"Hello","is_from_customer":false}"#,
        )
        .unwrap();
        match event {
            PushEvent::Message { kind, record } => {
                assert_eq!(kind, "message.created");
                assert_eq!(record.id, Some(55));
                assert_eq!(record.content, "Hello");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_status_changed_is_partial() {
        let event =
            parse_envelope(r#"{"type":"conversation.status_changed","id":7,"status":"snoozed"}"#)
                .unwrap();
        let PushEvent::Conversation { record, .. } = event else {
            panic!("expected conversation event");
        };
        assert_eq!(record.status, Some(ConversationStatus::Snoozed));
        assert_eq!(record.assignee_id, None);
        assert_eq!(record.id, 7);
    }

    #[test]
    fn test_unknown_type_is_not_an_error() {
        let event = parse_envelope(r#"{"type":"typing.on","user":3}"#).unwrap();
        assert_eq!(event, PushEvent::Unknown("typing.on".into()));
        assert_eq!(event.conversation_id(), None);
    }

    #[test]
    fn test_control_frames() {
        assert!(parse_envelope(r#"{"type":"ping","message":1}"#)
            .unwrap()
            .is_control());
        assert!(parse_envelope(r#"{"type":"welcome"}"#).unwrap().is_control());
    }

    #[test]
    fn test_malformed_frames() {
        assert!(parse_envelope("not json").unwrap_err().is_malformed());
        assert!(parse_envelope("[1,2]").unwrap_err().is_malformed());
        assert!(parse_envelope(r#"{"id":1}"#).unwrap_err().is_malformed());
        // Known type with an unusable payload
        assert!(parse_envelope(r#"{"type":"message.created","id":"x"}"#)
            .unwrap_err()
            .is_malformed());
    }
}
