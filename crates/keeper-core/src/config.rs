use crate::error::{KeeperError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

impl ConfigWarning {
    fn error(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Error,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Warning,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// QueueConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_resync_interval")]
    pub resync_interval_secs: u64,
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    #[serde(default = "default_selection_window")]
    pub selection_window: usize,
}

fn default_resync_interval() -> u64 {
    15 * 60
}

fn default_retry_interval() -> u64 {
    10
}

fn default_buffer_capacity() -> usize {
    1000
}

fn default_selection_window() -> usize {
    crate::selection::DEFAULT_WINDOW
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            resync_interval_secs: default_resync_interval(),
            retry_interval_secs: default_retry_interval(),
            buffer_capacity: default_buffer_capacity(),
            selection_window: default_selection_window(),
        }
    }
}

impl QueueConfig {
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }
}

// ---------------------------------------------------------------------------
// HttpConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_dequeue_timeout")]
    pub dequeue_timeout_secs: u64,
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

fn default_request_timeout() -> u64 {
    10
}

fn default_dequeue_timeout() -> u64 {
    3
}

fn default_shutdown_grace() -> u64 {
    10
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            dequeue_timeout_secs: default_dequeue_timeout(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_secs(self.dequeue_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

// ---------------------------------------------------------------------------
// StoreConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_connect_timeout() -> u64 {
    5
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl StoreConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Tuning knobs shared by every `secret-keeper` component. Every field has a
/// default, so an empty or partial YAML file is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl Config {
    /// Load from `path`, or return the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => {
                let data = std::fs::read_to_string(p).map_err(|e| {
                    KeeperError::Config(format!("cannot read {}: {e}", p.display()))
                })?;
                Self::from_yaml(&data)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(data)?)
    }

    /// Check for values that would stall or disable a component.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        if self.queue.resync_interval_secs == 0 {
            warnings.push(ConfigWarning::error(
                "queue.resync_interval_secs is 0: the queue would rebuild continuously",
            ));
        }
        if self.queue.retry_interval_secs == 0 {
            warnings.push(ConfigWarning::warning(
                "queue.retry_interval_secs is 0: failed rebuilds retry without delay",
            ));
        }
        if self.queue.buffer_capacity == 0 {
            warnings.push(ConfigWarning::error(
                "queue.buffer_capacity must be at least 1",
            ));
        }
        if self.queue.selection_window == 0 {
            warnings.push(ConfigWarning::warning(
                "queue.selection_window is 0: treated as 1 (always serve the stalest box)",
            ));
        }
        if self.queue.retry_interval_secs > self.queue.resync_interval_secs {
            warnings.push(ConfigWarning::warning(
                "queue.retry_interval_secs exceeds queue.resync_interval_secs",
            ));
        }
        if self.http.dequeue_timeout_secs == 0 || self.http.request_timeout_secs == 0 {
            warnings.push(ConfigWarning::error("http timeouts must be at least 1 second"));
        }
        if self.store.max_connections == 0 {
            warnings.push(ConfigWarning::error(
                "store.max_connections must be at least 1",
            ));
        }
        warnings
    }

    /// Fail on the first error-level warning.
    pub fn ensure_valid(&self) -> Result<()> {
        match self
            .validate()
            .into_iter()
            .find(|w| w.level == WarnLevel::Error)
        {
            Some(w) => Err(KeeperError::Config(w.message)),
            None => Ok(()),
        }
    }
}
