//! Threadscript Script Host
//!
//! Line-oriented interpreter for automation scripts. Each task runs one
//! interpreter on its own thread; everything the script does outside its
//! local integer variables goes through a host handler.
//!
//! ## Script language
//!
//! - `while <cond>` / `if <cond>` / `else` / `end` - nested control flow
//! - `name := 5`, `name++` - local integer variables
//! - `SetVar("k","v")`, `ThreadSetVar("k","v")`, `ThreadGetVar("k")` - shared store
//! - `WebSocketConnect("url")`, `WebSocketSend("msg")`, `WebSocketReceive()`,
//!   `WebSocketDisconnect()` - the shared WebSocket connection
//! - `Sleep(ms)` - block this task
//!
//! Lines starting with `;` are comments. Conditions are a single comparison
//! (`<=`, `>=`, `==`, `!=`, `<`, `>`) between variables or integer literals,
//! or a bare integer that is true when nonzero.

mod eval;
mod parser;
mod runtime;

pub use eval::*;
pub use parser::*;
pub use runtime::*;

use thiserror::Error;

/// Fatal script errors. Any of these stops the script for its task only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("Unsupported function: {0}")]
    UnsupportedFunction(String),

    #[error("else without if")]
    ElseWithoutIf,

    #[error("{0} requires 2 args")]
    MissingArgument(&'static str),
}

/// Configuration for script execution
#[derive(Debug, Clone)]
pub struct ScriptConfig {
    /// Sleep between stop-flag checks once the script has finished
    pub idle_poll_ms: u64,
    /// How often the idle phase bumps the heartbeat counter
    pub heartbeat_interval_ms: u64,
    /// Yield taken on blank or unrecognised lines
    pub unmatched_line_yield_ms: u64,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            idle_poll_ms: 1,
            heartbeat_interval_ms: 10,
            unmatched_line_yield_ms: 1,
        }
    }
}

/// Request from script to host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostRequest {
    /// Write a shared store entry
    SetVar { key: String, value: String },
    /// Read a shared store entry
    GetVar { key: String },
    /// Open the shared WebSocket connection
    WsConnect { url: String },
    /// Send a text message over the shared connection
    WsSend { message: String },
    /// Pop one queued inbound message, if any
    WsReceive,
    /// Close the shared connection
    WsDisconnect,
}

/// Response from host to script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostResponse {
    /// Value lookup result (store read or queued message)
    Value(Option<String>),
    /// Operation succeeded
    Ok,
    /// Operation failed
    Error(String),
}

impl HostResponse {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        !matches!(self, Self::Error(_))
    }

    #[must_use]
    pub fn into_value(self) -> Option<String> {
        match self {
            Self::Value(value) => value,
            Self::Ok | Self::Error(_) => None,
        }
    }
}

/// How the main script loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStatus {
    /// Ran off the end of the script
    Finished,
    /// A fatal script error stopped execution
    Error { message: String },
    /// The stop flag was raised while lines were still executing
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = ScriptConfig::default();
        assert_eq!(config.idle_poll_ms, 1);
        assert_eq!(config.heartbeat_interval_ms, 10);
        assert_eq!(config.unmatched_line_yield_ms, 1);
    }

    #[test]
    fn error_messages() {
        assert_eq!(ScriptError::ElseWithoutIf.to_string(), "else without if");
        assert_eq!(
            ScriptError::MissingArgument("ThreadSetVar").to_string(),
            "ThreadSetVar requires 2 args"
        );
        assert_eq!(
            ScriptError::UnsupportedFunction("Foo()".into()).to_string(),
            "Unsupported function: Foo()"
        );
    }

    #[test]
    fn host_response_helpers() {
        assert!(HostResponse::Ok.is_ok());
        assert!(!HostResponse::Error("x".into()).is_ok());
        assert_eq!(
            HostResponse::Value(Some("v".into())).into_value(),
            Some("v".to_string())
        );
        assert_eq!(HostResponse::Ok.into_value(), None);
    }
}
