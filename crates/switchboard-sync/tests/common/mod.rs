#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use switchboard_http::{
    ApiTransport, ConversationRecord, ConversationStatus, Frame, MessageRecord, PushConnection,
    PushTransport, Result as TransportResult, Scope, TransportError,
};
use switchboard_sync::{BadgeIcon, NotificationSink, SinkError};
use tokio::sync::mpsc;

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn message(conversation_id: u64, id: Option<u64>, content: &str, secs: i64, customer: bool) -> MessageRecord {
    MessageRecord {
        id,
        conversation_id,
        created_at: at(secs),
        content: content.to_string(),
        is_from_customer: customer,
        sender_type: None,
    }
}

pub fn conversation(id: u64, status: ConversationStatus, assignee: Option<u64>) -> ConversationRecord {
    ConversationRecord {
        id,
        contact_id: Some(500 + id),
        status: Some(status),
        assignee_id: Some(assignee),
        last_message_id: None,
        updated_at: Some(at(id as i64)),
    }
}

/// Push frame for a created message.
pub fn message_frame(record: &MessageRecord) -> Frame {
    let mut value = serde_json::to_value(record).unwrap();
    value["type"] = "message.created".into();
    Frame::Text(value.to_string())
}

/// REST backend with scripted listings and send behaviour.
pub struct FakeApi {
    pub conversations: Mutex<Vec<ConversationRecord>>,
    pub messages: Mutex<Vec<MessageRecord>>,
    pub send_delay: Mutex<Duration>,
    pub send_ids: Mutex<VecDeque<u64>>,
    pub fail_sends: Mutex<bool>,
    pub sends: AtomicUsize,
    pub fetches: AtomicUsize,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            conversations: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
            send_delay: Mutex::new(Duration::from_millis(100)),
            send_ids: Mutex::new(VecDeque::new()),
            fail_sends: Mutex::new(false),
            sends: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ApiTransport for FakeApi {
    async fn fetch_conversations(&self) -> TransportResult<Vec<ConversationRecord>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.conversations.lock().clone())
    }

    async fn fetch_messages(&self, conversation_id: u64) -> TransportResult<Vec<MessageRecord>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .messages
            .lock()
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    async fn send_message(&self, conversation_id: u64, content: &str) -> TransportResult<MessageRecord> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        let delay = *self.send_delay.lock();
        tokio::time::sleep(delay).await;
        if *self.fail_sends.lock() {
            return Err(TransportError::Status {
                status: 503,
                body: "unavailable".into(),
            });
        }
        let id = self.send_ids.lock().pop_front().unwrap_or(9_000);
        Ok(MessageRecord {
            id: Some(id),
            conversation_id,
            created_at: Utc::now(),
            content: content.to_string(),
            is_from_customer: false,
            sender_type: None,
        })
    }
}

/// Push transport whose connections are fed by test-held senders.
pub struct FakePush {
    pub connects: AtomicUsize,
    pub live: Arc<AtomicUsize>,
    servers: Mutex<Vec<mpsc::UnboundedSender<Frame>>>,
}

impl FakePush {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connects: AtomicUsize::new(0),
            live: Arc::new(AtomicUsize::new(0)),
            servers: Mutex::new(Vec::new()),
        })
    }

    /// Server side of the `index`-th connection.
    pub fn server(&self, index: usize) -> mpsc::UnboundedSender<Frame> {
        self.servers.lock()[index].clone()
    }

    pub fn latest(&self) -> mpsc::UnboundedSender<Frame> {
        let servers = self.servers.lock();
        servers[servers.len() - 1].clone()
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushTransport for FakePush {
    async fn connect(&self, _scope: &Scope) -> TransportResult<Box<dyn PushConnection>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.servers.lock().push(tx);
        Ok(Box::new(FakeConnection {
            frames: rx,
            live: self.live.clone(),
        }))
    }
}

struct FakeConnection {
    frames: mpsc::UnboundedReceiver<Frame>,
    live: Arc<AtomicUsize>,
}

#[async_trait]
impl PushConnection for FakeConnection {
    async fn next_frame(&mut self) -> TransportResult<Frame> {
        Ok(self
            .frames
            .recv()
            .await
            .unwrap_or_else(|| Frame::closed(Frame::ABNORMAL_CLOSE, "server gone")))
    }

    async fn close(&mut self) {
        self.frames.close();
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Notification sink that records every call.
#[derive(Default)]
pub struct RecordingSink {
    pub sounds: Mutex<Vec<String>>,
    pub badge_states: Mutex<Vec<bool>>,
    pub icons: Mutex<Vec<BadgeIcon>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn blink_starts(&self) -> usize {
        self.badge_states.lock().iter().filter(|b| **b).count()
    }
}

impl NotificationSink for RecordingSink {
    fn play_sound(&self, name: &str) -> Result<(), SinkError> {
        self.sounds.lock().push(name.to_string());
        Ok(())
    }

    fn set_badge_state(&self, blinking: bool) {
        self.badge_states.lock().push(blinking);
    }

    fn set_badge_icon(&self, icon: BadgeIcon) {
        self.icons.lock().push(icon);
    }
}
