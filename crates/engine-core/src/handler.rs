//! Routes script requests to the shared store and connection

use std::sync::Arc;

use threadscript_protocol::VarStore;
use threadscript_script_host::{HostRequest, HostResponse};
use threadscript_ws::WebSocketClient;

/// Host side of the script interpreter. Cheap to clone; every task gets one.
#[derive(Clone)]
pub struct HostHandler {
    store: Arc<dyn VarStore>,
    client: Arc<WebSocketClient>,
}

impl HostHandler {
    pub fn new(store: Arc<dyn VarStore>, client: Arc<WebSocketClient>) -> Self {
        Self { store, client }
    }

    pub fn handle(&self, request: HostRequest) -> HostResponse {
        match request {
            HostRequest::SetVar { key, value } => {
                self.store.set(&key, &value);
                HostResponse::Ok
            }
            HostRequest::GetVar { key } => HostResponse::Value(self.store.get(&key)),
            HostRequest::WsConnect { url } => {
                if self.client.connect(&url) {
                    HostResponse::Ok
                } else {
                    HostResponse::Error(format!("connect to {url} failed"))
                }
            }
            HostRequest::WsSend { message } => {
                if self.client.send(&message) {
                    HostResponse::Ok
                } else {
                    HostResponse::Error("send failed".to_string())
                }
            }
            HostRequest::WsReceive => HostResponse::Value(self.client.receive()),
            HostRequest::WsDisconnect => {
                self.client.disconnect();
                HostResponse::Ok
            }
        }
    }
}
