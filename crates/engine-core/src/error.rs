//! Engine error types

use threadscript_protocol::TaskId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Task {0} not found")]
    TaskNotFound(TaskId),

    #[error("Failed to start task thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Config error at {path}: {error}")]
    Config { path: String, error: String },
}
