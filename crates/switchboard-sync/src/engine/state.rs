use super::roster::Roster;
use super::thread::{MessageThread, Windows};
use super::{Change, ChangeSet, EngineInput};
use crate::config::SyncConfig;
use crate::models::{Channel, ConversationSummary, Message, Source};
use std::collections::HashMap;
use switchboard_http::PushEvent;
use tokio::time::Instant;
use tracing::{debug, trace};

/// The canonical roster and message lists.
///
/// Synchronous and clock-injected; the engine task owns one of these and is
/// its only writer.
#[derive(Debug)]
pub struct EngineState {
    roster: Roster,
    threads: HashMap<u64, MessageThread>,
    windows: Windows,
}

impl EngineState {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            roster: Roster::default(),
            threads: HashMap::new(),
            windows: Windows {
                optimistic: config.optimistic_window(),
                echo: config.echo_window(),
                ttl: config.transient_ttl(),
            },
        }
    }

    /// Apply one input observed at `now`.
    ///
    /// Snapshots always yield a change set, even an empty one, so observers
    /// can count deliveries. Other inputs yield one only when state changed.
    pub fn apply(&mut self, input: EngineInput, now: Instant) -> Option<ChangeSet> {
        let source = input.source();
        let (channel, changes) = match input {
            EngineInput::RosterSnapshot(records) => {
                (Channel::Roster, self.roster.apply_snapshot(&records))
            }
            EngineInput::MessageSnapshot {
                conversation_id,
                messages,
            } => {
                let thread = self.threads.entry(conversation_id).or_default();
                let changes = messages
                    .iter()
                    .filter_map(|record| {
                        thread.merge(Message::from_record(record), false, &self.windows, now)
                    })
                    .collect();
                (Channel::Conversation(conversation_id), changes)
            }
            EngineInput::Push(PushEvent::Conversation { kind, record }) => {
                trace!("[Engine] push {} for conversation {}", kind, record.id);
                let changes = self.roster.apply_push(&record).into_iter().collect();
                (Channel::Roster, changes)
            }
            EngineInput::Push(PushEvent::Message { kind, record }) => {
                trace!("[Engine] push {} for conversation {}", kind, record.conversation_id);
                self.roster.note_push(record.conversation_id);
                let thread = self.threads.entry(record.conversation_id).or_default();
                let changes = thread
                    .merge(Message::from_record(&record), false, &self.windows, now)
                    .into_iter()
                    .collect();
                (Channel::Conversation(record.conversation_id), changes)
            }
            EngineInput::Push(other) => {
                debug!("[Engine] Ignoring push event without state: {:?}", other);
                return None;
            }
            EngineInput::Optimistic(message) => {
                let conversation_id = message.conversation_id;
                let thread = self.threads.entry(conversation_id).or_default();
                let changes = thread
                    .merge(message, true, &self.windows, now)
                    .into_iter()
                    .collect();
                (Channel::Conversation(conversation_id), changes)
            }
            EngineInput::Confirm {
                conversation_id,
                client_key,
                record,
            } => {
                let thread = self.threads.entry(conversation_id).or_default();
                let changes = thread.confirm(client_key, Message::from_record(&record), now);
                (Channel::Conversation(conversation_id), changes)
            }
            EngineInput::Retract {
                conversation_id,
                client_key,
            } => {
                let changes = self
                    .threads
                    .get_mut(&conversation_id)
                    .and_then(|thread| thread.retract(client_key))
                    .into_iter()
                    .collect();
                (Channel::Conversation(conversation_id), changes)
            }
        };

        if changes.is_empty() && source != Source::Snapshot {
            return None;
        }
        Some(ChangeSet {
            source,
            channel,
            changes,
        })
    }

    /// Expire transient entries past the TTL; one change set per conversation.
    pub fn sweep(&mut self, now: Instant) -> Vec<ChangeSet> {
        let ttl = self.windows.ttl;
        let mut swept: Vec<ChangeSet> = self
            .threads
            .iter_mut()
            .filter_map(|(id, thread)| {
                let changes: Vec<Change> = thread.sweep(ttl, now);
                (!changes.is_empty()).then(|| ChangeSet {
                    source: Source::Optimistic,
                    channel: Channel::Conversation(*id),
                    changes,
                })
            })
            .collect();
        swept.sort_by_key(|set| set.channel);
        swept
    }

    pub fn reset(&mut self) {
        self.roster = Roster::default();
        self.threads.clear();
    }

    pub fn roster(&self) -> Vec<ConversationSummary> {
        self.roster.all()
    }

    pub fn active_roster(&self) -> Vec<ConversationSummary> {
        self.roster.active()
    }

    pub fn messages(&self, conversation_id: u64) -> Vec<Message> {
        self.threads
            .get(&conversation_id)
            .map(MessageThread::messages)
            .unwrap_or_default()
    }
}
