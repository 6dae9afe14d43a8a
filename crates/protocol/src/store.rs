//! Shared variable store interface
//!
//! Tasks and the host exchange data through a string-to-string mapping.
//! The interpreter and engine only depend on this trait, so the backing
//! implementation can be swapped without touching either.

/// A thread-safe string key/value store
pub trait VarStore: Send + Sync {
    /// Set `key` to `value`, replacing any previous value. Always succeeds.
    fn set(&self, key: &str, value: &str) -> bool;

    /// Get the value for `key`, or `None` if it was never set
    fn get(&self, key: &str) -> Option<String>;

    /// Whether `key` was ever set
    fn has(&self, key: &str) -> bool;
}

/// Extension trait for host-style access
pub trait VarStoreExt: VarStore {
    /// Get the value for `key`, with unknown keys reading as an empty string
    fn get_or_empty(&self, key: &str) -> String {
        self.get(key).unwrap_or_default()
    }
}

impl<T: VarStore + ?Sized> VarStoreExt for T {}
