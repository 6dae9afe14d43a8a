//! Threadscript Engine Core
//!
//! This crate provides:
//! - The shared variable store
//! - Task registry and per-task threads
//! - Request routing from scripts to the store and WebSocket connection
//! - The `Engine` context and its host-facing API
//! - Configuration loading

mod config;
mod engine;
mod error;
mod handler;
mod host;
mod registry;
mod store;
mod sync;

pub use config::*;
pub use engine::*;
pub use error::*;
pub use handler::*;
pub use host::*;
pub use registry::*;
pub use store::*;
