//! Engine context: the registry, store and connection one process shares

use std::collections::BTreeMap;
use std::sync::Arc;

use threadscript_ws::WebSocketClient;

use crate::{EngineConfig, HostHandler, MemoryStore, TaskRegistry};

/// Owns every shared component. Tasks reach the store and connection only
/// through the handler this context hands them.
pub struct Engine {
    config: EngineConfig,
    store: Arc<MemoryStore>,
    client: Arc<WebSocketClient>,
    registry: TaskRegistry,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let client = Arc::new(WebSocketClient::new(config.client_config()));
        let handler = HostHandler::new(store.clone(), client.clone());
        let registry = TaskRegistry::new(config.script_config(), store.clone(), handler);

        tracing::debug!(?config, "Engine initialized");
        Self {
            config,
            store,
            client,
            registry,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn client(&self) -> &WebSocketClient {
        &self.client
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Sorted copy of the whole store
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.store.snapshot()
    }

    /// Destroy every live task, returning how many were stopped
    pub fn shutdown(&self) -> usize {
        let ids = self.registry.ids();
        ids.into_iter().filter(|&id| self.destroy_task(id)).count()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
        self.client.disconnect();
    }
}
