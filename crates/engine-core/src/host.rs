//! Host-facing API: variable access, task control and connection passthrough

use std::time::Duration;

use threadscript_protocol::{TaskId, VarStore, VarStoreExt, WsStatus, host_keys};

use crate::{Engine, EngineError};

/// Fixed body returned by [`Engine::http_request`]
pub const CANNED_HTTP_RESPONSE: &str = "HTTP/1.1 200 OK\r\n\
    Content-Type: application/json\r\n\
    \r\n\
    {\"status\":\"success\",\"message\":\"Request processed\"}";

impl Engine {
    pub fn set_var(&self, name: &str, value: &str) -> bool {
        self.store().set(name, value)
    }

    /// Unknown names read as an empty string
    pub fn get_var(&self, name: &str) -> String {
        self.store().get_or_empty(name)
    }

    pub fn has_var(&self, name: &str) -> bool {
        self.store().has(name)
    }

    /// Start a script as a new task
    pub fn create_task(&self, script: &str) -> Result<TaskId, EngineError> {
        let id = self.registry().create(script)?;
        self.registry().increment_count();
        Ok(id)
    }

    pub fn destroy_task(&self, id: TaskId) -> bool {
        let destroyed = self.registry().destroy(id);
        if destroyed {
            self.registry().decrement_count();
        }
        destroyed
    }

    /// Block until the task exits. The timeout is not enforced.
    pub fn wait_for_task(&self, id: TaskId, timeout: Duration) -> bool {
        self.registry().wait(id, timeout)
    }

    pub fn pause_task(&self, id: TaskId) -> bool {
        self.registry().pause(id).is_ok()
    }

    pub fn resume_task(&self, id: TaskId) -> bool {
        self.registry().resume(id).is_ok()
    }

    pub fn task_count(&self) -> i64 {
        self.registry().count()
    }

    pub fn connect(&self, url: &str) -> bool {
        let connected = self.client().connect(url);
        let status = if connected {
            self.set_var(host_keys::WEBSOCKET_URL, url);
            WsStatus::Connected
        } else {
            WsStatus::Failed
        };
        self.set_var(host_keys::WEBSOCKET_STATUS, status.as_str());
        connected
    }

    pub fn send(&self, message: &str) -> bool {
        let sent = self.client().send(message);
        if sent {
            self.set_var(host_keys::WEBSOCKET_LAST_SENT, message);
        }
        sent
    }

    /// Pop one queued message; empty if none is waiting
    pub fn receive(&self) -> String {
        self.client().receive().unwrap_or_default()
    }

    pub fn disconnect(&self) {
        self.client().disconnect();
        self.set_var(host_keys::WEBSOCKET_STATUS, WsStatus::Disconnected.as_str());
    }

    pub fn is_connected(&self) -> bool {
        self.client().is_connected()
    }

    /// Stub request helper. Makes no network call and always returns the
    /// same canned success response.
    pub fn http_request(&self, url: &str, method: &str) -> String {
        tracing::debug!(%url, %method, "Stub HTTP request");
        self.set_var(host_keys::HTTP_LAST_RESPONSE, CANNED_HTTP_RESPONSE);
        CANNED_HTTP_RESPONSE.to_string()
    }
}
