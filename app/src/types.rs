//! Output types
//!
//! JSON reports printed by the `run` and `check` subcommands.

use std::collections::BTreeMap;

use serde::Serialize;
use threadscript_protocol::TaskId;

/// One task started by `run`
#[derive(Debug, Serialize)]
pub struct TaskReport {
    pub id: TaskId,
    pub script: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Last executed line number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<String>,
}

/// Output of `run`
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub tasks: Vec<TaskReport>,
    /// Every store entry at shutdown, sorted by key
    pub variables: BTreeMap<String, String>,
}

/// A line `check` found would stop the script
#[derive(Debug, Serialize)]
pub struct LineFailure {
    /// Line number in the file
    pub line: usize,
    pub text: String,
    pub error: String,
}

/// Output of `check`
#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub script: String,
    /// Executable lines after dropping blanks and comments
    pub lines: usize,
    pub failures: Vec<LineFailure>,
}
