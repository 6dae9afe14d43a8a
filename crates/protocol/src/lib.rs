//! Threadscript Protocol
//!
//! Types shared by the interpreter, the engine and host integrations.
//! The `task_<id>_<field>` key convention for the shared variable store
//! lives here so every crate spells it the same way.

mod store;
mod types;

pub use store::*;
pub use types::*;
