//! Scope switching and component wiring.

use crate::config::SyncConfig;
use crate::engine::{EngineInput, ReconciliationEngine};
use crate::error::{Result, SyncError};
use crate::models::ConnectionState;
use crate::notify::{NotificationSignaler, NotificationSink};
use crate::pending::PendingSendTracker;
use crate::poller::{scope_fetch, PollEvent, PollSchedule, PollingScheduler};
use crate::supervisor::{ConnectionSupervisor, EventStream, SupervisorEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use switchboard_http::client::HeartbeatConfig;
use switchboard_http::{ApiTransport, PushTransport, Scope};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

struct ActiveScope {
    scope: Scope,
    poller: PollingScheduler,
    pump: JoinHandle<()>,
}

/// One operator session: the active scope plus every component feeding the
/// engine for it.
pub struct SyncSession {
    config: SyncConfig,
    api: Arc<dyn ApiTransport>,
    supervisor: ConnectionSupervisor,
    engine: ReconciliationEngine,
    tracker: PendingSendTracker,
    signaler: Arc<NotificationSignaler>,
    signaler_task: JoinHandle<()>,
    poll_events: broadcast::Sender<PollEvent>,
    generation: AtomicU64,
    active: Mutex<Option<ActiveScope>>,
}

impl SyncSession {
    pub fn new(
        config: SyncConfig,
        api: Arc<dyn ApiTransport>,
        push: Arc<dyn PushTransport>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let engine = ReconciliationEngine::spawn(&config);
        let mut supervisor = ConnectionSupervisor::new(push, config.reconnect_policy());
        if let Some(secs) = config.heartbeat_interval_secs {
            supervisor = supervisor.with_heartbeat(HeartbeatConfig::new(secs));
        }
        let tracker = PendingSendTracker::new(api.clone(), engine.clone(), &config);
        let signaler = Arc::new(NotificationSignaler::new(sink, &config));
        let signaler_task = signaler.clone().run(engine.subscribe());
        let (poll_events, _) = broadcast::channel(16);

        Self {
            config,
            api,
            supervisor,
            engine,
            tracker,
            signaler,
            signaler_task,
            poll_events,
            generation: AtomicU64::new(0),
            active: Mutex::new(None),
        }
    }

    pub async fn open_conversation(&self, conversation_id: u64) -> Result<()> {
        self.switch_to(Scope::Conversation(conversation_id)).await
    }

    pub async fn open_dashboard(&self, account_id: u64) -> Result<()> {
        self.switch_to(Scope::Tenant(account_id)).await
    }

    async fn switch_to(&self, scope: Scope) -> Result<()> {
        let mut active = self.active.lock().await;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!("[Session] Switching to {} (generation {})", scope, generation);

        if let Some(previous) = active.take() {
            self.stop_scope(previous).await;
        }
        self.engine.reset(generation).await?;
        self.signaler.reset();

        let events = self.supervisor.open(scope).await;
        let pump = tokio::spawn(pump_events(events, self.engine.clone(), generation));
        let poller = PollingScheduler::start(
            PollSchedule {
                interval: self.config.poll_interval(),
                degraded_after: self.config.degraded_after_failures,
                generation,
            },
            scope_fetch(self.api.clone(), scope),
            self.engine.clone(),
            self.poll_events.clone(),
        );

        *active = Some(ActiveScope {
            scope,
            poller,
            pump,
        });
        Ok(())
    }

    async fn stop_scope(&self, previous: ActiveScope) {
        debug!("[Session] Stopping {}", previous.scope);
        previous.poller.stop();
        self.supervisor.teardown(&previous.scope).await;
        // The pump ends once the supervisor drops its event sender.
        let _ = previous.pump.await;
    }

    /// Send a message in the open conversation.
    pub async fn send(&self, content: &str) -> Result<Uuid> {
        let scope = self.active_scope().await;
        let conversation_id = scope
            .and_then(|s| s.conversation_id())
            .ok_or(SyncError::NoConversation)?;
        self.tracker.submit(conversation_id, content).await
    }

    pub async fn resubmit(&self, client_key: Uuid) -> Result<Uuid> {
        self.tracker.resubmit(client_key).await
    }

    /// Resume polling after the credential was refreshed.
    pub async fn resume_polling(&self) {
        if let Some(active) = self.active.lock().await.as_ref() {
            active.poller.resume();
        }
    }

    pub async fn active_scope(&self) -> Option<Scope> {
        self.active.lock().await.as_ref().map(|a| a.scope)
    }

    pub async fn connection_state(&self) -> Option<watch::Receiver<ConnectionState>> {
        let scope = self.active_scope().await?;
        self.supervisor.state(&scope).await
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    pub fn tracker(&self) -> &PendingSendTracker {
        &self.tracker
    }

    pub fn signaler(&self) -> &NotificationSignaler {
        &self.signaler
    }

    pub fn poll_events(&self) -> broadcast::Receiver<PollEvent> {
        self.poll_events.subscribe()
    }

    /// Tear down the active scope and stop alerting.
    pub async fn shutdown(&self) {
        if let Some(previous) = self.active.lock().await.take() {
            self.stop_scope(previous).await;
        }
        self.supervisor.teardown_all().await;
        self.signaler.clear();
        self.signaler_task.abort();
        info!("[Session] Shut down");
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().take() {
            active.poller.stop();
            active.pump.abort();
        }
        self.signaler_task.abort();
    }
}

/// Forward push messages into the engine under one generation.
async fn pump_events(mut events: EventStream, engine: ReconciliationEngine, generation: u64) {
    while let Some(event) = events.recv().await {
        match event {
            SupervisorEvent::Message(push) => {
                if engine
                    .submit(generation, EngineInput::Push(push))
                    .await
                    .is_err()
                {
                    return;
                }
            }
            SupervisorEvent::Connected => debug!("[Session] Push connected"),
            SupervisorEvent::Closed { code, reason } => {
                debug!("[Session] Push closed: {} {}", code, reason)
            }
            SupervisorEvent::Connecting => {}
        }
    }
}
