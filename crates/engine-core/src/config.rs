//! Engine configuration

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use threadscript_script_host::ScriptConfig;
use threadscript_ws::{ClientConfig, DEFAULT_MAX_MESSAGE_SIZE};

use crate::EngineError;

/// Tuning for task execution and the shared WebSocket connection.
///
/// Every field has a default, so a config file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Idle-phase sleep between stop-flag checks (ms)
    pub idle_poll_ms: u64,
    /// Heartbeat publish period during the idle phase (ms)
    pub heartbeat_interval_ms: u64,
    /// Yield for blank or unmatched lines (ms)
    pub unmatched_line_yield_ms: u64,
    /// TCP connect timeout per resolved address (ms)
    pub ws_connect_timeout_ms: u64,
    /// Receive-loop read chunk size (bytes)
    pub ws_read_buffer: usize,
    /// Read timeout of the TLS transport's receive loop (ms)
    pub ws_poll_interval_ms: u64,
    /// Largest inbound WebSocket message before the connection is dropped (bytes)
    pub ws_max_message_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            idle_poll_ms: 1,
            heartbeat_interval_ms: 10,
            unmatched_line_yield_ms: 1,
            ws_connect_timeout_ms: 5000,
            ws_read_buffer: 4096,
            ws_poll_interval_ms: 50,
            ws_max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl EngineConfig {
    /// Load a config from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| EngineError::Config {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

        serde_json::from_str(&content).map_err(|e| EngineError::Config {
            path: path.display().to_string(),
            error: e.to_string(),
        })
    }

    #[must_use]
    pub fn script_config(&self) -> ScriptConfig {
        ScriptConfig {
            idle_poll_ms: self.idle_poll_ms,
            heartbeat_interval_ms: self.heartbeat_interval_ms,
            unmatched_line_yield_ms: self.unmatched_line_yield_ms,
        }
    }

    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            connect_timeout: Duration::from_millis(self.ws_connect_timeout_ms),
            read_buffer: self.ws_read_buffer,
            poll_interval: Duration::from_millis(self.ws_poll_interval_ms),
            max_message_size: self.ws_max_message_size,
        }
    }
}
