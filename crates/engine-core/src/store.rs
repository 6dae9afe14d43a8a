//! In-memory shared variable store

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use threadscript_protocol::VarStore;

use crate::sync::MutexExt;

/// Process-wide string map behind a single mutex. Last writer wins.
#[derive(Debug, Default)]
pub struct MemoryStore {
    vars: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every entry, ordered by key
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.vars
            .lock_or_recover()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.lock_or_recover().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl VarStore for MemoryStore {
    fn set(&self, key: &str, value: &str) -> bool {
        self.vars
            .lock_or_recover()
            .insert(key.to_string(), value.to_string());
        true
    }

    fn get(&self, key: &str) -> Option<String> {
        self.vars.lock_or_recover().get(key).cloned()
    }

    fn has(&self, key: &str) -> bool {
        self.vars.lock_or_recover().contains_key(key)
    }
}
