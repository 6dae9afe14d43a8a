//! TLS transport backed by tungstenite

use std::io::{ErrorKind, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Mutex;

use tungstenite::error::CapacityError;
use tungstenite::protocol::WebSocketConfig;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use crate::sync::MutexExt;
use crate::transport::as_timeout;
use crate::{ClientConfig, Scheme, Transport, WsError, WsUrl};

type TlsSocket = WebSocket<MaybeTlsStream<TcpStream>>;

/// `wss://` transport.
///
/// The socket carries a short read timeout so the receive thread releases
/// the lock regularly and senders are not starved.
pub struct SecureTransport {
    socket: Mutex<TlsSocket>,
    control: TcpStream,
}

impl SecureTransport {
    /// Perform the TLS and WebSocket handshakes over an open TCP stream
    pub fn handshake(url: &WsUrl, stream: TcpStream, config: &ClientConfig) -> Result<Self, WsError> {
        let control = stream.try_clone()?;
        control.set_read_timeout(as_timeout(config.connect_timeout))?;

        let mut limits = WebSocketConfig::default();
        limits.max_message_size = Some(config.max_message_size);
        limits.max_frame_size = Some(config.max_message_size);

        let (socket, response) =
            tungstenite::client_tls_with_config(url.to_string(), stream, Some(limits), None)
                .map_err(|e| WsError::Handshake(e.to_string()))?;
        tracing::debug!(status = %response.status(), "TLS handshake complete");

        control.set_read_timeout(as_timeout(config.poll_interval))?;
        Ok(Self {
            socket: Mutex::new(socket),
            control,
        })
    }
}

fn map_error(error: tungstenite::Error) -> WsError {
    match error {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => WsError::Closed,
        tungstenite::Error::Io(e) => WsError::Io(e),
        tungstenite::Error::Capacity(CapacityError::MessageTooLong { size, max_size }) => {
            WsError::MessageTooLarge {
                len: size as u64,
                max: max_size,
            }
        }
        other => WsError::Tls(other.to_string()),
    }
}

impl Transport for SecureTransport {
    fn scheme(&self) -> Scheme {
        Scheme::Secure
    }

    fn send_text(&self, message: &str) -> Result<(), WsError> {
        self.socket
            .lock_or_recover()
            .send(Message::Text(message.to_string()))
            .map_err(map_error)
    }

    fn receive(&self) -> Result<Vec<String>, WsError> {
        let mut socket = self.socket.lock_or_recover();
        match socket.read() {
            Ok(Message::Text(text)) => Ok(vec![text]),
            Ok(Message::Binary(data)) => Ok(vec![String::from_utf8_lossy(&data).into_owned()]),
            // Pongs are queued by tungstenite and flushed on the next read or write
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => Ok(Vec::new()),
            Ok(Message::Close(_)) => Err(WsError::Closed),
            Err(tungstenite::Error::Io(e))
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                Ok(Vec::new())
            }
            Err(e) => Err(map_error(e)),
        }
    }

    fn close(&self) {
        {
            let mut socket = self.socket.lock_or_recover();
            if let Err(e) = socket.close(None) {
                tracing::debug!(error = %e, "Close frame not sent");
            }
            if let MaybeTlsStream::Rustls(tls) = socket.get_mut() {
                tls.conn.send_close_notify();
                let _ = tls.flush();
            }
        }
        let _ = self.control.shutdown(Shutdown::Both);
    }
}
