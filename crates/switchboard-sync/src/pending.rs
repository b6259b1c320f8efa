//! Optimistic send tracking.
//!
//! A send is registered as `pending`, shown immediately as a transient
//! message, and settles as `confirmed` when either the send response or a
//! push echo identifies it, or as `failed` with its content preserved.

use crate::config::SyncConfig;
use crate::engine::{Change, EngineInput, ReconciliationEngine};
use crate::error::{Result, SyncError};
use crate::models::{normalize_content, Message, PendingSend, PendingStatus};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use switchboard_http::ApiTransport;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

struct Tracked {
    send: PendingSend,
    settled_at: Option<Instant>,
}

type Entries = Arc<Mutex<HashMap<Uuid, Tracked>>>;

/// Tracks in-flight sends and reconciles them against their echoes.
pub struct PendingSendTracker {
    api: Arc<dyn ApiTransport>,
    engine: ReconciliationEngine,
    entries: Entries,
    ack_timeout: Duration,
    send_deadline: Duration,
    retention: Duration,
    listener: JoinHandle<()>,
}

impl PendingSendTracker {
    /// Create the tracker and start listening for promotions on the change feed.
    pub fn new(api: Arc<dyn ApiTransport>, engine: ReconciliationEngine, config: &SyncConfig) -> Self {
        let entries: Entries = Arc::new(Mutex::new(HashMap::new()));
        let listener = tokio::spawn(listen_for_echoes(engine.clone(), entries.clone()));
        Self {
            api,
            engine,
            entries,
            ack_timeout: config.ack_timeout(),
            send_deadline: config.send_deadline(),
            retention: config.pending_retention(),
            listener,
        }
    }

    /// Send `content` to a conversation exactly as typed.
    ///
    /// Normalized content is only used to detect a duplicate pending send.
    /// Resolves with the client key once the send has settled as confirmed.
    /// A failed send returns `SendFailed` carrying the content for resubmission.
    pub async fn submit(&self, conversation_id: u64, content: &str) -> Result<Uuid> {
        let normalized = normalize_content(content);
        if normalized.is_empty() {
            return Err(SyncError::SendFailed {
                content: content.to_string(),
                reason: "message is empty".to_string(),
            });
        }

        let client_key = Uuid::new_v4();
        {
            let mut entries = self.entries.lock();
            prune(&mut entries, self.retention);
            let duplicate = entries.values().any(|t| {
                t.send.conversation_id == conversation_id
                    && t.send.status == PendingStatus::Pending
                    && normalize_content(&t.send.content) == normalized
            });
            if duplicate {
                debug!("[Pending] Rejecting duplicate send in conversation {}", conversation_id);
                return Err(SyncError::DuplicateSubmission);
            }
            entries.insert(
                client_key,
                Tracked {
                    send: PendingSend::new(client_key, conversation_id, content.to_string()),
                    settled_at: None,
                },
            );
        }

        let generation = self.engine.generation();
        let placeholder = Message::optimistic(conversation_id, content, client_key, Utc::now());
        if let Err(e) = self
            .engine
            .submit(generation, EngineInput::Optimistic(placeholder))
            .await
        {
            self.settle(client_key, PendingStatus::Failed, Some(e.to_string()));
            return Err(e);
        }

        info!("[Pending] Sending {} to conversation {}", client_key, conversation_id);
        self.deliver(client_key, conversation_id, content.to_string(), generation)
            .await
    }

    /// Re-submit the preserved content of a failed send under a new key.
    pub async fn resubmit(&self, client_key: Uuid) -> Result<Uuid> {
        let failed = {
            let mut entries = self.entries.lock();
            match entries.get(&client_key) {
                Some(t) if t.send.status == PendingStatus::Failed => {
                    entries.remove(&client_key).map(|t| t.send)
                }
                _ => None,
            }
        };
        let failed = failed.ok_or(SyncError::NotResubmittable(client_key))?;
        self.submit(failed.conversation_id, &failed.content).await
    }

    pub fn get(&self, client_key: Uuid) -> Option<PendingSend> {
        self.entries.lock().get(&client_key).map(|t| t.send.clone())
    }

    /// Tracked sends for a conversation, oldest first.
    pub fn pending_for(&self, conversation_id: u64) -> Vec<PendingSend> {
        let mut entries = self.entries.lock();
        prune(&mut entries, self.retention);
        let mut sends: Vec<_> = entries
            .values()
            .filter(|t| t.send.conversation_id == conversation_id)
            .map(|t| t.send.clone())
            .collect();
        sends.sort_by_key(|s| s.submitted_at);
        sends
    }

    async fn deliver(
        &self,
        client_key: Uuid,
        conversation_id: u64,
        content: String,
        generation: u64,
    ) -> Result<Uuid> {
        let ack_timeout = self.ack_timeout;
        let attempt = async {
            let send = self.api.send_message(conversation_id, &content);
            tokio::pin!(send);
            tokio::select! {
                result = &mut send => return result,
                _ = tokio::time::sleep(ack_timeout) => self.mark_stalled(client_key),
            }
            send.await
        };

        let outcome = match tokio::time::timeout(self.send_deadline, attempt).await {
            Ok(result) => result.map_err(SyncError::from),
            Err(_) => Err(SyncError::TransientNetwork(format!(
                "no response within {:?}",
                self.send_deadline
            ))),
        };

        match outcome {
            Ok(record) => {
                let confirm = EngineInput::Confirm {
                    conversation_id,
                    client_key,
                    record,
                };
                if let Err(e) = self.engine.submit(generation, confirm).await {
                    warn!("[Pending] Could not apply send response for {}: {}", client_key, e);
                }
                self.settle(client_key, PendingStatus::Confirmed, None);
                debug!("[Pending] {} confirmed by send response", client_key);
                Ok(client_key)
            }
            Err(error) => {
                if self.status(client_key) == Some(PendingStatus::Confirmed) {
                    debug!(
                        "[Pending] {} already confirmed by echo, ignoring send error: {}",
                        client_key, error
                    );
                    return Ok(client_key);
                }
                warn!("[Pending] Send {} failed: {}", client_key, error);
                self.settle(client_key, PendingStatus::Failed, Some(error.to_string()));
                let retract = EngineInput::Retract {
                    conversation_id,
                    client_key,
                };
                if let Err(e) = self.engine.submit(generation, retract).await {
                    debug!("[Pending] Could not retract {}: {}", client_key, e);
                }
                Err(SyncError::SendFailed {
                    content,
                    reason: error.to_string(),
                })
            }
        }
    }

    fn status(&self, client_key: Uuid) -> Option<PendingStatus> {
        self.entries.lock().get(&client_key).map(|t| t.send.status)
    }

    fn mark_stalled(&self, client_key: Uuid) {
        if let Some(tracked) = self.entries.lock().get_mut(&client_key) {
            if tracked.send.status == PendingStatus::Pending {
                info!("[Pending] {} has no acknowledgement yet, still sending", client_key);
                tracked.send.stalled = true;
            }
        }
    }

    fn settle(&self, client_key: Uuid, status: PendingStatus, error: Option<String>) {
        settle(&mut self.entries.lock(), client_key, status, error);
    }
}

impl Drop for PendingSendTracker {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

/// Only a pending entry can settle; confirmation is never undone.
fn settle(
    entries: &mut HashMap<Uuid, Tracked>,
    client_key: Uuid,
    status: PendingStatus,
    error: Option<String>,
) {
    if let Some(tracked) = entries.get_mut(&client_key) {
        if tracked.send.status == PendingStatus::Pending {
            tracked.send.status = status;
            tracked.send.error = error;
            tracked.settled_at = Some(Instant::now());
        }
    }
}

fn prune(entries: &mut HashMap<Uuid, Tracked>, retention: Duration) {
    entries.retain(|_, t| match t.settled_at {
        Some(at) => at.elapsed() < retention,
        None => true,
    });
}

async fn listen_for_echoes(engine: ReconciliationEngine, entries: Entries) {
    let mut feed = engine.subscribe();
    drop(engine);
    loop {
        let set = match feed.recv().await {
            Ok(set) => set,
            Err(RecvError::Lagged(skipped)) => {
                warn!("[Pending] Change feed lagged, skipped {} change sets", skipped);
                continue;
            }
            Err(RecvError::Closed) => return,
        };
        for change in &set.changes {
            if let Change::MessagePromoted {
                client_key: Some(client_key),
                ..
            } = change
            {
                let mut entries = entries.lock();
                if entries.contains_key(client_key) {
                    debug!("[Pending] {} confirmed by echo", client_key);
                    settle(&mut entries, *client_key, PendingStatus::Confirmed, None);
                }
            }
        }
    }
}
