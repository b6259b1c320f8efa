//! Periodic snapshot polling.

use crate::engine::{EngineInput, ReconciliationEngine};
use crate::error::SyncError;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use switchboard_http::{ApiTransport, Scope};
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Poll health reported to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    /// `failures` consecutive fetches failed; the last error is attached.
    Degraded { failures: u32, error: SyncError },
    /// A fetch succeeded after the poller reported degradation.
    Recovered,
    /// The credential was rejected; polling is paused until `resume`.
    AuthExpired,
}

/// Build the snapshot fetch for a scope: the roster for a tenant, the
/// message list for a conversation.
pub fn scope_fetch(
    api: Arc<dyn ApiTransport>,
    scope: Scope,
) -> impl FnMut() -> BoxFuture<'static, Result<EngineInput, SyncError>> + Send + 'static {
    move || {
        let api = api.clone();
        Box::pin(async move {
            match scope {
                Scope::Tenant(_) => {
                    let records = api.fetch_conversations().await?;
                    Ok(EngineInput::RosterSnapshot(records))
                }
                Scope::Conversation(conversation_id) => {
                    let messages = api.fetch_messages(conversation_id).await?;
                    Ok(EngineInput::MessageSnapshot {
                        conversation_id,
                        messages,
                    })
                }
            }
        })
    }
}

/// Tunables for one polling schedule.
#[derive(Debug, Clone)]
pub struct PollSchedule {
    pub interval: Duration,
    /// Consecutive failures tolerated before reporting degradation.
    pub degraded_after: u32,
    /// Generation stamped on every forwarded snapshot.
    pub generation: u64,
}

/// A running poll loop. Dropping the handle does not stop it; call `stop`.
pub struct PollingScheduler {
    task: JoinHandle<()>,
    paused: Arc<AtomicBool>,
    failures: Arc<AtomicU32>,
    resume: Arc<Notify>,
}

impl PollingScheduler {
    /// Fetch immediately, then every `schedule.interval`.
    ///
    /// Ticks that come due while a fetch is outstanding are skipped.
    pub fn start<F, Fut>(
        schedule: PollSchedule,
        mut fetch: F,
        engine: ReconciliationEngine,
        events: broadcast::Sender<PollEvent>,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<EngineInput, SyncError>> + Send + 'static,
    {
        let paused = Arc::new(AtomicBool::new(false));
        let failures = Arc::new(AtomicU32::new(0));
        let resume = Arc::new(Notify::new());

        let task = {
            let paused = paused.clone();
            let failures = failures.clone();
            let resume = resume.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(schedule.interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                let mut degraded = false;

                loop {
                    ticker.tick().await;
                    let started = Instant::now();

                    match fetch().await {
                        Ok(input) => {
                            failures.store(0, Ordering::SeqCst);
                            if degraded {
                                degraded = false;
                                info!("[Poller] Recovered");
                                let _ = events.send(PollEvent::Recovered);
                            }
                            if engine.submit(schedule.generation, input).await.is_err() {
                                debug!("[Poller] Engine stopped, ending poll loop");
                                return;
                            }
                        }
                        Err(error) if error.is_access_denied() => {
                            warn!("[Poller] Credential rejected, pausing until resumed");
                            paused.store(true, Ordering::SeqCst);
                            let _ = events.send(PollEvent::AuthExpired);
                            resume.notified().await;
                            debug!("[Poller] Resumed");
                            ticker.reset_immediately();
                            continue;
                        }
                        Err(error) => {
                            let count = failures.fetch_add(1, Ordering::SeqCst) + 1;
                            if error.is_retryable() {
                                debug!("[Poller] Fetch failed ({} in a row): {}", count, error);
                            } else {
                                warn!("[Poller] Fetch failed ({} in a row): {}", count, error);
                            }
                            if count >= schedule.degraded_after && !degraded {
                                degraded = true;
                                warn!("[Poller] {} consecutive failures: {}", count, error);
                                let _ = events.send(PollEvent::Degraded {
                                    failures: count,
                                    error,
                                });
                            }
                        }
                    }

                    // A tick that came due mid-fetch is dropped, not run late.
                    if started.elapsed() >= schedule.interval {
                        debug!("[Poller] Fetch overran the interval, skipping a tick");
                        ticker.tick().await;
                    }
                }
            })
        };

        Self {
            task,
            paused,
            failures,
            resume,
        }
    }

    /// Resume after re-authentication; fetches right away.
    pub fn resume(&self) {
        if self.paused.swap(false, Ordering::SeqCst) {
            self.resume.notify_one();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}
