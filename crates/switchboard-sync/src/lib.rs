//! Real-time conversation synchronization.
//!
//! Push events, periodic snapshots and optimistic local sends are merged by
//! a single-writer [`ReconciliationEngine`]; everything else talks to it
//! through its input queue and change feed.

pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod notify;
pub mod pending;
pub mod poller;
pub mod session;
pub mod supervisor;

pub use config::{SwitchboardConfig, SyncConfig};
pub use engine::{Change, ChangeSet, EngineInput, EngineState, ReconciliationEngine};
pub use error::{Result, SyncError};
pub use models::{
    Channel, ConnectionState, ConnectionStatus, ConversationSummary, Message, PendingSend,
    PendingStatus, Source,
};
pub use notify::{AlertClass, BadgeIcon, NotificationSignaler, NotificationSink, SinkError};
pub use pending::PendingSendTracker;
pub use poller::{PollEvent, PollSchedule, PollingScheduler};
pub use session::SyncSession;
pub use supervisor::{ConnectionSupervisor, EventStream, SupervisorEvent};
