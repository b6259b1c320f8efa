//! Heartbeat-aware wrapper around a push connection.

use crate::error::Result;
use crate::traits::PushConnection;
use crate::types::Frame;
use std::time::Duration;
use tokio::time::Instant;

/// Close code reported when the server stops sending anything.
pub const HEARTBEAT_TIMEOUT_CODE: u16 = 4000;

/// Configuration for heartbeat timeout detection.
#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatConfig {
    pub interval_secs: f64,
    pub timeout: Duration,
}

impl HeartbeatConfig {
    pub fn new(interval_secs: f64) -> Self {
        let timeout_secs = 1.2 * interval_secs + 3.0;
        Self {
            interval_secs,
            timeout: Duration::from_secs_f64(timeout_secs),
        }
    }
}

/// A live push connection plus idle tracking.
pub struct Subscription {
    connection: Box<dyn PushConnection>,
    heartbeat_config: Option<HeartbeatConfig>,
    last_activity: Instant,
}

impl Subscription {
    pub fn new(connection: Box<dyn PushConnection>) -> Self {
        Subscription {
            connection,
            heartbeat_config: None,
            last_activity: Instant::now(),
        }
    }

    pub fn with_heartbeat(
        connection: Box<dyn PushConnection>,
        heartbeat_config: HeartbeatConfig,
    ) -> Self {
        Subscription {
            connection,
            heartbeat_config: Some(heartbeat_config),
            last_activity: Instant::now(),
        }
    }

    /// Next frame, or a synthetic close once the heartbeat deadline passes.
    pub async fn next(&mut self) -> Result<Frame> {
        let Some(ref config) = self.heartbeat_config else {
            let frame = self.connection.next_frame().await;
            self.last_activity = Instant::now();
            return frame;
        };

        let deadline = self.last_activity + config.timeout;
        tokio::select! {
            frame = self.connection.next_frame() => {
                self.last_activity = Instant::now();
                frame
            }
            _ = tokio::time::sleep_until(deadline) => {
                tracing::warn!(
                    "[Push] No frame within {:?}, treating connection as dead",
                    config.timeout
                );
                Ok(Frame::closed(HEARTBEAT_TIMEOUT_CODE, "heartbeat timeout"))
            }
        }
    }

    pub async fn close(&mut self) {
        self.connection.close().await;
    }
}
