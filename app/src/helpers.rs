//! Helper functions and constants
//!
//! Script file loading and config discovery.

use std::fs;
use std::path::{Path, PathBuf};

use threadscript_engine::{EngineConfig, EngineError};
use thiserror::Error;

/// Maximum length for script source
pub const MAX_SCRIPT_LENGTH: usize = 256 * 1024; // 256 KB

/// Directory name under the user config dir
pub const CONFIG_DIR_NAME: &str = "threadscript";

/// Config file name inside [`CONFIG_DIR_NAME`]
pub const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error at {path}: {error}")]
    Io { path: String, error: String },

    #[error("Script {path} is {len} bytes (maximum: {max})")]
    ScriptTooLarge { path: String, len: usize, max: usize },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Failed to serialize output: {0}")]
    Output(#[from] serde_json::Error),
}

/// Read a script file, rejecting oversized input
pub fn read_script(path: &Path) -> Result<String, AppError> {
    let source = fs::read_to_string(path).map_err(|e| AppError::Io {
        path: path.display().to_string(),
        error: e.to_string(),
    })?;

    if source.len() > MAX_SCRIPT_LENGTH {
        return Err(AppError::ScriptTooLarge {
            path: path.display().to_string(),
            len: source.len(),
            max: MAX_SCRIPT_LENGTH,
        });
    }
    Ok(source)
}

/// `<config dir>/threadscript/config.json`, if the platform has a config dir
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Load an explicit config, else the default file if present, else defaults
pub fn load_config(explicit: Option<&Path>) -> Result<EngineConfig, AppError> {
    if let Some(path) = explicit {
        return Ok(EngineConfig::load(path)?);
    }
    match default_config_path() {
        Some(path) if path.is_file() => {
            tracing::debug!(path = %path.display(), "Using default config");
            Ok(EngineConfig::load(&path)?)
        }
        _ => Ok(EngineConfig::default()),
    }
}
