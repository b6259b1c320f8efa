//! Push connection supervision.
//!
//! One task per scope owns the live connection, reconnects after non-clean
//! closes, and forwards decoded events to the caller.

use crate::models::{ConnectionState, ConnectionStatus};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use switchboard_http::client::{
    HeartbeatConfig, ReconnectPolicy, RetryState, Subscription,
};
use switchboard_http::types::parse_envelope;
use switchboard_http::{Frame, PushEvent, PushTransport, Scope};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long a clean teardown may take before the task is aborted.
const CLOSE_GRACE: Duration = Duration::from_secs(2);
const EVENT_BUFFER: usize = 256;

/// Events delivered for one scope.
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorEvent {
    Connecting,
    Connected,
    Message(PushEvent),
    Closed { code: u16, reason: String },
}

pub type EventStream = mpsc::Receiver<SupervisorEvent>;

struct LiveConnection {
    task: JoinHandle<()>,
    stop: Option<oneshot::Sender<()>>,
    state: watch::Receiver<ConnectionState>,
}

impl LiveConnection {
    /// Ask the task to close cleanly, then make sure it is gone.
    async fn shut_down(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if tokio::time::timeout(CLOSE_GRACE, &mut self.task).await.is_err() {
            self.task.abort();
            let _ = (&mut self.task).await;
        }
    }
}

/// Owns at most one live push connection per scope.
pub struct ConnectionSupervisor {
    transport: Arc<dyn PushTransport>,
    policy: ReconnectPolicy,
    heartbeat: Option<HeartbeatConfig>,
    live: Mutex<HashMap<Scope, LiveConnection>>,
}

impl ConnectionSupervisor {
    pub fn new(transport: Arc<dyn PushTransport>, policy: ReconnectPolicy) -> Self {
        Self {
            transport,
            policy,
            heartbeat: None,
            live: Mutex::new(HashMap::new()),
        }
    }

    /// Treat a connection that stays silent past the heartbeat deadline as dropped.
    #[must_use]
    pub fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = Some(heartbeat);
        self
    }

    /// Open the connection for `scope`, replacing any existing one.
    ///
    /// The previous connection's task has finished before the new one is
    /// spawned, so its event stream ends without further events.
    pub async fn open(&self, scope: Scope) -> EventStream {
        let mut live = self.live.lock().await;
        if let Some(previous) = live.remove(&scope) {
            info!("[Supervisor] Replacing live connection for {}", scope);
            previous.shut_down().await;
        }

        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (state_tx, state_rx) = watch::channel(ConnectionState::default());
        let (stop_tx, stop_rx) = oneshot::channel();

        let worker = ConnectionWorker {
            scope,
            transport: self.transport.clone(),
            retry: RetryState::new(self.policy.clone()),
            heartbeat: self.heartbeat.clone(),
            events: events_tx,
            state: state_tx,
            stop: stop_rx,
        };
        let task = tokio::spawn(worker.run());

        live.insert(
            scope,
            LiveConnection {
                task,
                stop: Some(stop_tx),
                state: state_rx,
            },
        );
        events_rx
    }

    /// Close the connection for `scope` and cancel any pending reconnect.
    pub async fn teardown(&self, scope: &Scope) {
        let previous = self.live.lock().await.remove(scope);
        if let Some(previous) = previous {
            info!("[Supervisor] Tearing down {}", scope);
            previous.shut_down().await;
        }
    }

    pub async fn teardown_all(&self) {
        let drained: Vec<_> = self.live.lock().await.drain().collect();
        for (scope, connection) in drained {
            debug!("[Supervisor] Tearing down {}", scope);
            connection.shut_down().await;
        }
    }

    /// Connection state for `scope`, if it has a supervised connection.
    pub async fn state(&self, scope: &Scope) -> Option<watch::Receiver<ConnectionState>> {
        self.live.lock().await.get(scope).map(|c| c.state.clone())
    }

    /// Number of scopes whose connection task is still running.
    pub async fn live_count(&self) -> usize {
        self.live
            .lock()
            .await
            .values()
            .filter(|c| !c.task.is_finished())
            .count()
    }
}

enum Exit {
    Stopped,
    Closed { code: u16, reason: String },
}

struct ConnectionWorker {
    scope: Scope,
    transport: Arc<dyn PushTransport>,
    retry: RetryState,
    heartbeat: Option<HeartbeatConfig>,
    events: mpsc::Sender<SupervisorEvent>,
    state: watch::Sender<ConnectionState>,
    stop: oneshot::Receiver<()>,
}

impl ConnectionWorker {
    async fn run(mut self) {
        loop {
            if !self.emit(SupervisorEvent::Connecting).await {
                return;
            }

            let connected = tokio::select! {
                result = self.transport.connect(&self.scope) => result,
                _ = &mut self.stop => {
                    self.set_closed(None);
                    return;
                }
            };

            let (code, reason) = match connected {
                Ok(connection) => {
                    self.retry.reset();
                    self.publish(ConnectionStatus::Open, None);
                    info!("[Supervisor] Connected {}", self.scope);
                    if !self.emit(SupervisorEvent::Connected).await {
                        return;
                    }

                    let mut subscription = match self.heartbeat {
                        Some(ref heartbeat) => {
                            Subscription::with_heartbeat(connection, heartbeat.clone())
                        }
                        None => Subscription::new(connection),
                    };
                    match self.read_frames(&mut subscription).await {
                        Exit::Stopped => {
                            subscription.close().await;
                            self.set_closed(None);
                            return;
                        }
                        Exit::Closed { code, reason } => (code, reason),
                    }
                }
                Err(e) if e.is_access_denied() => {
                    warn!(
                        "[Supervisor] {} rejected the credential, not reconnecting: {}",
                        self.scope, e
                    );
                    self.set_closed(Some(e.to_string()));
                    let _ = self
                        .events
                        .send(SupervisorEvent::Closed {
                            code: Frame::ABNORMAL_CLOSE,
                            reason: e.to_string(),
                        })
                        .await;
                    return;
                }
                Err(e) => {
                    if e.is_retryable() {
                        debug!("[Supervisor] Connect to {} failed: {}", self.scope, e);
                    } else {
                        warn!(
                            "[Supervisor] Connect to {} failed and may keep failing: {}",
                            self.scope, e
                        );
                    }
                    (Frame::ABNORMAL_CLOSE, e.to_string())
                }
            };

            if !self
                .emit(SupervisorEvent::Closed {
                    code,
                    reason: reason.clone(),
                })
                .await
            {
                return;
            }

            if code == Frame::NORMAL_CLOSE {
                info!("[Supervisor] {} closed normally", self.scope);
                self.set_closed(None);
                return;
            }

            let delay = self.retry.next_attempt();

            warn!(
                "[Supervisor] {} closed ({} {}), reconnecting in {:?}",
                self.scope, code, reason, delay
            );
            self.publish(ConnectionStatus::Reconnecting, Some(reason));

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = &mut self.stop => {
                    self.set_closed(None);
                    return;
                }
            }
        }
    }

    async fn read_frames(&mut self, subscription: &mut Subscription) -> Exit {
        loop {
            let frame = tokio::select! {
                frame = subscription.next() => frame,
                _ = &mut self.stop => return Exit::Stopped,
            };

            match frame {
                Ok(Frame::Text(text)) => match parse_envelope(&text) {
                    Ok(event) if event.is_control() => {}
                    Ok(PushEvent::Unknown(kind)) => {
                        debug!("[Supervisor] Ignoring push type {:?}", kind);
                    }
                    Ok(event) => {
                        if !self.emit(SupervisorEvent::Message(event)).await {
                            return Exit::Stopped;
                        }
                    }
                    Err(e) => {
                        warn!("[Supervisor] Dropping malformed frame on {}: {}", self.scope, e);
                    }
                },
                Ok(Frame::Closed { code, reason }) => return Exit::Closed { code, reason },
                Err(e) => {
                    return Exit::Closed {
                        code: Frame::ABNORMAL_CLOSE,
                        reason: e.to_string(),
                    }
                }
            }
        }
    }

    /// False once the caller dropped the event stream.
    async fn emit(&self, event: SupervisorEvent) -> bool {
        if self.events.send(event).await.is_err() {
            debug!("[Supervisor] Event stream for {} dropped, stopping", self.scope);
            return false;
        }
        true
    }

    fn publish(&self, status: ConnectionStatus, last_error: Option<String>) {
        let retry_count = self.retry.attempts;
        self.state.send_modify(|state| {
            state.status = status;
            state.retry_count = retry_count;
            if last_error.is_some() {
                state.last_error = last_error;
            }
        });
    }

    fn set_closed(&self, last_error: Option<String>) {
        self.publish(ConnectionStatus::Closed, last_error);
    }
}
