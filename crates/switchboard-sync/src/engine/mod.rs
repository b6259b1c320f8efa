//! Reconciliation engine.
//!
//! Canonical state lives in one task fed by an mpsc queue. Snapshot, push
//! and optimistic inputs are merged into a roster and per-conversation
//! message lists, and every applied input is published on a broadcast
//! change feed.
//!
//! Messages carry no shared sequence number, so an optimistic send and its
//! server echo are matched on `(content, direction)` within a short window
//! of local arrival time. Two identical messages inside that window collapse
//! into one.

mod roster;
mod state;
mod thread;

pub use state::EngineState;

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::models::{Channel, ConversationSummary, Message, Source};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use switchboard_http::{ConversationRecord, MessageRecord, PushEvent};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace};
use uuid::Uuid;

/// One input to the engine.
#[derive(Debug, Clone)]
pub enum EngineInput {
    /// Full conversation listing from a poll.
    RosterSnapshot(Vec<ConversationRecord>),
    /// Full message listing for one conversation from a poll.
    MessageSnapshot {
        conversation_id: u64,
        messages: Vec<MessageRecord>,
    },
    /// A decoded push event.
    Push(PushEvent),
    /// A local placeholder for an outgoing send.
    Optimistic(Message),
    /// The send call for `client_key` returned the server's record.
    Confirm {
        conversation_id: u64,
        client_key: Uuid,
        record: MessageRecord,
    },
    /// The send for `client_key` failed; drop its placeholder.
    Retract {
        conversation_id: u64,
        client_key: Uuid,
    },
}

impl EngineInput {
    pub fn source(&self) -> Source {
        match self {
            EngineInput::RosterSnapshot(_) | EngineInput::MessageSnapshot { .. } => Source::Snapshot,
            EngineInput::Push(_) => Source::Push,
            EngineInput::Optimistic(_) | EngineInput::Confirm { .. } | EngineInput::Retract { .. } => {
                Source::Optimistic
            }
        }
    }
}

/// A single canonical state transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    ConversationAdded(ConversationSummary),
    ConversationUpdated {
        previous: ConversationSummary,
        current: ConversationSummary,
    },
    ConversationRemoved(ConversationSummary),
    MessageAdded(Message),
    MessageReplaced {
        previous: Message,
        current: Message,
    },
    /// A transient entry was replaced by its authoritative counterpart.
    MessagePromoted {
        client_key: Option<Uuid>,
        message: Message,
    },
    MessageRemoved(Message),
    TransientExpired {
        client_key: Option<Uuid>,
        message: Message,
    },
}

/// Everything one input changed, published on the change feed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet {
    pub source: Source,
    pub channel: Channel,
    pub changes: Vec<Change>,
}

enum Command {
    Apply {
        generation: u64,
        input: EngineInput,
    },
    Reset {
        generation: u64,
        done: oneshot::Sender<()>,
    },
    Roster(oneshot::Sender<Vec<ConversationSummary>>),
    ActiveRoster(oneshot::Sender<Vec<ConversationSummary>>),
    Messages(u64, oneshot::Sender<Vec<Message>>),
}

/// Handle to the engine task. Cheap to clone; the task stops once every
/// handle is dropped.
#[derive(Clone)]
pub struct ReconciliationEngine {
    commands: mpsc::Sender<Command>,
    feed: broadcast::Sender<ChangeSet>,
    generation: Arc<AtomicU64>,
}

impl ReconciliationEngine {
    /// Spawn the engine task on the current runtime.
    pub fn spawn(config: &SyncConfig) -> Self {
        let (commands, rx) = mpsc::channel(config.input_queue_capacity.max(1));
        let (feed, _) = broadcast::channel(config.change_feed_capacity.max(1));
        let generation = Arc::new(AtomicU64::new(0));

        let actor = EngineActor {
            state: EngineState::new(config),
            commands: rx,
            feed: feed.clone(),
            generation: generation.clone(),
            sweep_interval: config.sweep_interval(),
        };
        tokio::spawn(actor.run());

        Self {
            commands,
            feed,
            generation,
        }
    }

    /// Generation currently accepted by the engine.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeSet> {
        self.feed.subscribe()
    }

    /// Queue an input. It is dropped by the engine if `generation` is stale.
    pub async fn submit(&self, generation: u64, input: EngineInput) -> Result<()> {
        self.commands
            .send(Command::Apply { generation, input })
            .await
            .map_err(|_| SyncError::EngineClosed)
    }

    /// Clear all state and start accepting `generation`.
    pub async fn reset(&self, generation: u64) -> Result<()> {
        let (done, wait) = oneshot::channel();
        self.commands
            .send(Command::Reset { generation, done })
            .await
            .map_err(|_| SyncError::EngineClosed)?;
        wait.await.map_err(|_| SyncError::EngineClosed)
    }

    pub async fn roster(&self) -> Result<Vec<ConversationSummary>> {
        self.query(Command::Roster).await
    }

    /// Non-closed conversations, most recently updated first.
    pub async fn active_roster(&self) -> Result<Vec<ConversationSummary>> {
        self.query(Command::ActiveRoster).await
    }

    pub async fn messages(&self, conversation_id: u64) -> Result<Vec<Message>> {
        self.query(|reply| Command::Messages(conversation_id, reply))
            .await
    }

    async fn query<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, wait) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| SyncError::EngineClosed)?;
        wait.await.map_err(|_| SyncError::EngineClosed)
    }
}

struct EngineActor {
    state: EngineState,
    commands: mpsc::Receiver<Command>,
    feed: broadcast::Sender<ChangeSet>,
    generation: Arc<AtomicU64>,
    sweep_interval: Duration,
}

impl EngineActor {
    async fn run(mut self) {
        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else { break };
                    self.handle(command);
                }
                _ = sweep.tick() => {
                    for set in self.state.sweep(Instant::now()) {
                        debug!("[Engine] Swept {} expired transient(s) in {}", set.changes.len(), set.channel);
                        self.publish(set);
                    }
                }
            }
        }
        debug!("[Engine] All handles dropped, stopping");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Apply { generation, input } => {
                let current = self.generation.load(Ordering::SeqCst);
                if generation != current {
                    debug!(
                        "[Engine] Discarding {:?} input from generation {} (current {})",
                        input.source(),
                        generation,
                        current
                    );
                    return;
                }
                if let Some(set) = self.state.apply(input, Instant::now()) {
                    self.publish(set);
                }
            }
            Command::Reset { generation, done } => {
                self.state.reset();
                self.generation.store(generation, Ordering::SeqCst);
                info!("[Engine] Reset for generation {}", generation);
                let _ = done.send(());
            }
            Command::Roster(reply) => {
                let _ = reply.send(self.state.roster());
            }
            Command::ActiveRoster(reply) => {
                let _ = reply.send(self.state.active_roster());
            }
            Command::Messages(id, reply) => {
                let _ = reply.send(self.state.messages(id));
            }
        }
    }

    fn publish(&self, set: ChangeSet) {
        trace!(
            "[Engine] {:?} {} -> {} change(s)",
            set.source,
            set.channel,
            set.changes.len()
        );
        // No subscribers is fine
        let _ = self.feed.send(set);
    }
}
