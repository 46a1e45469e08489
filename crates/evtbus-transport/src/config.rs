//! Runtime configuration for the tokio backend.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Invalid backend configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Queue cannot hold any envelope
    #[error("Queue depth must be at least 1")]
    ZeroQueueDepth,

    /// Dispatcher task needs a name for its logs
    #[error("Task name must not be empty")]
    EmptyTaskName,
}

/// Configuration for [`TokioBackend`](crate::TokioBackend)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokioBackendConfig {
    /// Number of envelopes the queue holds before publish reports it full.
    pub queue_depth: usize,
    /// Heartbeat period in milliseconds. `0` disables the heartbeat and the
    /// dispatcher waits for work indefinitely.
    pub heartbeat_ms: u64,
    /// Name of the dispatcher task, used in logs.
    pub task_name: String,
}

impl Default for TokioBackendConfig {
    fn default() -> Self {
        Self {
            queue_depth: 16,
            heartbeat_ms: 0,
            task_name: "evt_bus".to_string(),
        }
    }
}

impl TokioBackendConfig {
    /// Heartbeat period, if enabled
    pub fn heartbeat(&self) -> Option<Duration> {
        (self.heartbeat_ms > 0).then(|| Duration::from_millis(self.heartbeat_ms))
    }

    /// Check the configuration can be used to start a dispatcher
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_depth == 0 {
            return Err(ConfigError::ZeroQueueDepth);
        }
        if self.task_name.trim().is_empty() {
            return Err(ConfigError::EmptyTaskName);
        }
        Ok(())
    }
}
