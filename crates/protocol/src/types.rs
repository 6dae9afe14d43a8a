//! Common types used across the interpreter and the engine

use std::fmt;

use serde::{Deserialize, Serialize};

/// Task identifier, issued in creation order starting at 1 and never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Store key for one of this task's published fields
    #[must_use]
    pub fn key(self, field: TaskField) -> String {
        format!("task_{}_{}", self.0, field.as_str())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-task fields published to the shared variable store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskField {
    Status,
    Error,
    Line,
    WsStatus,
    WsLastSent,
    WsLastReceived,
    LastGet,
    Heartbeat,
}

impl TaskField {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Error => "error",
            Self::Line => "line",
            Self::WsStatus => "ws_status",
            Self::WsLastSent => "ws_last_sent",
            Self::WsLastReceived => "ws_last_received",
            Self::LastGet => "last_get",
            Self::Heartbeat => "heartbeat",
        }
    }
}

/// Lifecycle status published under `task_<id>_status`
///
/// A script error does not produce a distinct status: the task still
/// reports `completed` and the error text goes to `task_<id>_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Completed,
}

impl TaskStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
        }
    }
}

/// Connection status published by WebSocket commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WsStatus {
    Connected,
    Failed,
    Disconnected,
}

impl WsStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Failed => "failed",
            Self::Disconnected => "disconnected",
        }
    }
}

/// Process-wide store keys written by the host passthrough API
pub mod host_keys {
    pub const WEBSOCKET_URL: &str = "websocket_url";
    pub const WEBSOCKET_STATUS: &str = "websocket_status";
    pub const WEBSOCKET_LAST_SENT: &str = "websocket_last_sent";
    pub const HTTP_LAST_RESPONSE: &str = "http_last_response";
}
