//! Transport abstraction over plain and TLS connections

use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use crate::{PlainTransport, Scheme, SecureTransport, WsError, WsUrl};

/// Client tuning knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    /// Per-address TCP connect timeout
    pub connect_timeout: Duration,
    /// Size of each socket read
    pub read_buffer: usize,
    /// Read timeout used by transports that must poll
    pub poll_interval: Duration,
    /// Largest inbound message accepted before the connection is dropped
    pub max_message_size: usize,
}

/// Default for [`ClientConfig::max_message_size`]
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(5000),
            read_buffer: 4096,
            poll_interval: Duration::from_millis(50),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// An established WebSocket connection.
///
/// `receive` is only ever called from the receive thread, while `send_text`
/// and `close` may be called from any task thread.
pub trait Transport: Send + Sync {
    fn scheme(&self) -> Scheme;

    /// Send one text message
    fn send_text(&self, message: &str) -> Result<(), WsError>;

    /// Block until at least one read completes and return the complete text
    /// messages it yielded. An empty vector means nothing complete arrived.
    fn receive(&self) -> Result<Vec<String>, WsError>;

    /// Close the connection, unblocking any pending `receive`
    fn close(&self);
}

/// Resolve `host` and try each address in turn
pub fn connect_tcp(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, WsError> {
    let addrs = (host, port).to_socket_addrs().map_err(|e| WsError::Resolve {
        host: host.to_string(),
        reason: e.to_string(),
    })?;

    let mut attempted = false;
    for addr in addrs {
        attempted = true;
        let attempt = match as_timeout(timeout) {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => {
                tracing::debug!(%addr, "TCP connected");
                return Ok(stream);
            }
            Err(e) => tracing::debug!(%addr, error = %e, "TCP connect failed"),
        }
    }

    if !attempted {
        return Err(WsError::Resolve {
            host: host.to_string(),
            reason: "no addresses".to_string(),
        });
    }
    Err(WsError::Connect {
        host: host.to_string(),
        port,
    })
}

/// Zero means "no timeout", which std rejects as a timeout value
pub(crate) fn as_timeout(duration: Duration) -> Option<Duration> {
    (!duration.is_zero()).then_some(duration)
}

/// Run the handshake for `url` over `stream` and wrap it in the matching transport
pub fn establish(
    url: &WsUrl,
    stream: TcpStream,
    config: &ClientConfig,
) -> Result<Arc<dyn Transport>, WsError> {
    let transport: Arc<dyn Transport> = match url.scheme {
        Scheme::Plain => Arc::new(PlainTransport::handshake(url, stream, config)?),
        Scheme::Secure => Arc::new(SecureTransport::handshake(url, stream, config)?),
    };
    Ok(transport)
}
