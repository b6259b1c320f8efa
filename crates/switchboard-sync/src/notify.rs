//! Sound and badge alerts driven by the change feed.

use crate::config::SyncConfig;
use crate::engine::{Change, ChangeSet};
use crate::models::{Channel, ConversationSummary, Source};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use switchboard_http::ConversationStatus;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeIcon {
    Normal,
    Alert,
}

impl BadgeIcon {
    fn toggled(self) -> Self {
        match self {
            BadgeIcon::Normal => BadgeIcon::Alert,
            BadgeIcon::Alert => BadgeIcon::Normal,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Sound playback failed: {0}")]
pub struct SinkError(pub String);

/// Platform side effects for alerts.
pub trait NotificationSink: Send + Sync + 'static {
    fn play_sound(&self, name: &str) -> Result<(), SinkError>;
    fn set_badge_state(&self, blinking: bool);
    fn set_badge_icon(&self, icon: BadgeIcon);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertClass {
    NewConversationForMe,
    NewMessage,
    Other,
}

/// Classify one change for the operator `actor`.
pub fn classify(change: &Change, actor: Option<u64>) -> AlertClass {
    match change {
        Change::MessageAdded(message)
            if message.id.is_some()
                && !message.transient
                && message.direction == switchboard_http::Direction::Customer =>
        {
            AlertClass::NewMessage
        }
        Change::ConversationAdded(current) => {
            if is_unassigned_and_relevant(current) || is_mine(current, actor) {
                AlertClass::NewConversationForMe
            } else {
                AlertClass::Other
            }
        }
        Change::ConversationUpdated { previous, current } => {
            if is_mine(current, actor) && !is_mine(previous, actor) {
                AlertClass::NewConversationForMe
            } else {
                AlertClass::Other
            }
        }
        _ => AlertClass::Other,
    }
}

fn is_unassigned_and_relevant(conversation: &ConversationSummary) -> bool {
    conversation.assignee_id.is_none()
        && matches!(
            conversation.status,
            ConversationStatus::Open | ConversationStatus::Pending
        )
}

fn is_mine(conversation: &ConversationSummary, actor: Option<u64>) -> bool {
    actor.is_some() && conversation.assignee_id == actor
}

/// Snapshot of the signaler's bookkeeping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationState {
    /// Channels whose first snapshot since reset has been seen.
    pub seen_snapshot: HashSet<Channel>,
    pub blinking: bool,
    pub sound_enabled: bool,
    pub focused: bool,
}

struct Inner {
    state: NotificationState,
    blink: Option<JoinHandle<()>>,
}

/// Turns change sets into sounds and a blinking badge.
pub struct NotificationSignaler {
    sink: Arc<dyn NotificationSink>,
    actor: Option<u64>,
    message_sound: String,
    conversation_sound: String,
    blink_interval: Duration,
    inner: Mutex<Inner>,
}

impl NotificationSignaler {
    pub fn new(sink: Arc<dyn NotificationSink>, config: &SyncConfig) -> Self {
        Self {
            sink,
            actor: config.actor_id,
            message_sound: config.message_sound.clone(),
            conversation_sound: config.conversation_sound.clone(),
            blink_interval: config.blink_interval(),
            inner: Mutex::new(Inner {
                state: NotificationState {
                    sound_enabled: config.sound_enabled,
                    ..Default::default()
                },
                blink: None,
            }),
        }
    }

    /// Consume a change feed until it closes.
    pub fn run(self: Arc<Self>, mut feed: broadcast::Receiver<ChangeSet>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match feed.recv().await {
                    Ok(set) => self.handle(&set),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("[Notify] Change feed lagged, skipped {} change sets", skipped);
                    }
                    Err(RecvError::Closed) => return,
                }
            }
        })
    }

    /// Process one change set.
    pub fn handle(&self, set: &ChangeSet) {
        let (conversation_alert, message_alert, sound_enabled) = {
            let mut inner = self.inner.lock();
            if set.source == Source::Snapshot && inner.state.seen_snapshot.insert(set.channel) {
                debug!(
                    "[Notify] Suppressing first snapshot for {} ({} changes)",
                    set.channel,
                    set.changes.len()
                );
                return;
            }
            let classes: Vec<_> = set
                .changes
                .iter()
                .map(|change| classify(change, self.actor))
                .collect();
            (
                classes.contains(&AlertClass::NewConversationForMe),
                classes.contains(&AlertClass::NewMessage),
                inner.state.sound_enabled,
            )
        };

        if !conversation_alert && !message_alert {
            return;
        }
        if sound_enabled {
            if conversation_alert {
                self.play(&self.conversation_sound);
            }
            if message_alert {
                self.play(&self.message_sound);
            }
        }
        self.start_blinking();
    }

    fn play(&self, name: &str) {
        if let Err(e) = self.sink.play_sound(name) {
            debug!("[Notify] {}", e);
        }
    }

    fn start_blinking(&self) {
        let mut inner = self.inner.lock();
        if inner.state.blinking || inner.state.focused {
            return;
        }
        inner.state.blinking = true;
        self.sink.set_badge_state(true);

        let sink = self.sink.clone();
        let period = self.blink_interval;
        inner.blink = Some(tokio::spawn(async move {
            let mut icon = BadgeIcon::Normal;
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                icon = icon.toggled();
                sink.set_badge_icon(icon);
            }
        }));
    }

    fn stop_blinking(&self, inner: &mut Inner) {
        if let Some(blink) = inner.blink.take() {
            blink.abort();
        }
        if inner.state.blinking {
            inner.state.blinking = false;
            self.sink.set_badge_icon(BadgeIcon::Normal);
            self.sink.set_badge_state(false);
        }
    }

    /// Regaining focus stops the blink loop.
    pub fn set_focused(&self, focused: bool) {
        let mut inner = self.inner.lock();
        inner.state.focused = focused;
        if focused {
            self.stop_blinking(&mut inner);
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        self.stop_blinking(&mut inner);
    }

    pub fn set_sound_enabled(&self, enabled: bool) {
        self.inner.lock().state.sound_enabled = enabled;
    }

    /// Forget seen snapshots and stop blinking, for a scope switch.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state.seen_snapshot.clear();
        self.stop_blinking(&mut inner);
    }

    pub fn is_blinking(&self) -> bool {
        self.inner.lock().state.blinking
    }

    pub fn state(&self) -> NotificationState {
        self.inner.lock().state.clone()
    }
}

impl Drop for NotificationSignaler {
    fn drop(&mut self) {
        if let Some(blink) = self.inner.get_mut().blink.take() {
            blink.abort();
        }
    }
}
