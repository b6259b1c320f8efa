//! Switchboard transport clients.

mod config;
mod fetch;
pub mod native_network;
pub mod retry;
mod subscription;
mod utils;

pub use config::ClientConfig;
pub use fetch::ApiClient;
pub use native_network::{WsConnection, WsTransport};
pub use retry::{ReconnectPolicy, RetryState};
pub use subscription::{HeartbeatConfig, Subscription, HEARTBEAT_TIMEOUT_CODE};
pub use utils::*;
