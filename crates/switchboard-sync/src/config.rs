//! Sync engine configuration.
//!
//! Timings are stored in milliseconds so the JSON file stays readable.
//! Precedence: built-in defaults, then the config file, then `SWITCHBOARD_*`
//! environment variables.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use switchboard_http::client::ReconnectPolicy;
use switchboard_http::ClientConfig;
use tracing::{info, warn};

/// Timing and alerting knobs for the sync components.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Fixed delay before a reconnect attempt.
    pub reconnect_delay_ms: u64,
    /// Expected server heartbeat; enables idle detection when set.
    pub heartbeat_interval_secs: Option<f64>,
    /// Snapshot poll interval.
    pub poll_interval_ms: u64,
    /// Consecutive poll failures before the poller reports degradation.
    pub degraded_after_failures: u32,
    /// Dedup window when the arriving entry is itself optimistic.
    pub optimistic_window_ms: u64,
    /// Dedup and promotion window for server echoes.
    pub echo_window_ms: u64,
    /// Unpromoted transient entries are swept after this long.
    pub transient_ttl_ms: u64,
    pub sweep_interval_ms: u64,
    /// A send without any acknowledgement after this long is flagged stalled.
    pub ack_timeout_ms: u64,
    /// Overall deadline for a send call.
    pub send_deadline_ms: u64,
    /// Settled pending sends are kept this long for queries.
    pub pending_retention_ms: u64,
    pub blink_interval_ms: u64,
    pub sound_enabled: bool,
    pub message_sound: String,
    pub conversation_sound: String,
    /// Current operator, for "assigned to me" alerts.
    pub actor_id: Option<u64>,
    pub input_queue_capacity: usize,
    pub change_feed_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: 3_000,
            heartbeat_interval_secs: None,
            poll_interval_ms: 10_000,
            degraded_after_failures: 3,
            optimistic_window_ms: 1_000,
            echo_window_ms: 2_000,
            transient_ttl_ms: 15_000,
            sweep_interval_ms: 1_000,
            ack_timeout_ms: 2_000,
            send_deadline_ms: 30_000,
            pending_retention_ms: 60_000,
            blink_interval_ms: 1_000,
            sound_enabled: true,
            message_sound: "message".to_string(),
            conversation_sound: "new_conversation".to_string(),
            actor_id: None,
            input_queue_capacity: 256,
            change_feed_capacity: 256,
        }
    }
}

impl SyncConfig {
    /// Apply `SWITCHBOARD_*` overrides on top of the current values.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(ms) = env_u64("SWITCHBOARD_POLL_INTERVAL_MS") {
            self.poll_interval_ms = ms;
        }
        if let Some(ms) = env_u64("SWITCHBOARD_RECONNECT_DELAY_MS") {
            self.reconnect_delay_ms = ms;
        }
        if let Some(id) = env_u64("SWITCHBOARD_ACTOR_ID") {
            self.actor_id = Some(id);
        }
        if let Ok(val) = std::env::var("SWITCHBOARD_SOUND") {
            self.sound_enabled = !matches!(val.trim(), "0" | "false" | "off");
        }
        self
    }

    #[must_use]
    pub fn with_actor(mut self, actor_id: u64) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    #[must_use]
    pub fn with_sound(mut self, enabled: bool) -> Self {
        self.sound_enabled = enabled;
        self
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::fixed(Duration::from_millis(self.reconnect_delay_ms))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn optimistic_window(&self) -> Duration {
        Duration::from_millis(self.optimistic_window_ms)
    }

    pub fn echo_window(&self) -> Duration {
        Duration::from_millis(self.echo_window_ms)
    }

    pub fn transient_ttl(&self) -> Duration {
        Duration::from_millis(self.transient_ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn send_deadline(&self) -> Duration {
        Duration::from_millis(self.send_deadline_ms)
    }

    pub fn pending_retention(&self) -> Duration {
        Duration::from_millis(self.pending_retention_ms)
    }

    pub fn blink_interval(&self) -> Duration {
        Duration::from_millis(self.blink_interval_ms)
    }
}

fn env_u64(key: &str) -> Option<u64> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a number", key, raw);
            None
        }
    }
}

/// Everything the console persists: transport endpoints plus sync timings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchboardConfig {
    pub client: ClientConfig,
    pub sync: SyncConfig,
}

impl SwitchboardConfig {
    /// `<platform config dir>/switchboard/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("switchboard").join("config.json"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| SyncError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load the file at `path` (or the default location) if it exists,
    /// falling back to defaults, then apply env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let resolved = path.map(Path::to_path_buf).or_else(Self::default_path);
        let config = match resolved {
            Some(ref file) if file.exists() => {
                info!("Loading config from {:?}", file);
                Self::load_from(file)?
            }
            Some(ref file) if path.is_some() => {
                return Err(SyncError::Config(format!(
                    "config file {} does not exist",
                    file.display()
                )));
            }
            _ => Self::default(),
        };
        Ok(config.with_env_overrides())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        Self {
            client: self.client.with_env_overrides(),
            sync: self.sync.with_env_overrides(),
        }
    }
}
