//! Process-wide WebSocket client

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::sync::MutexExt;
use crate::{ClientConfig, Transport, WsError, WsUrl, connect_tcp, establish};

/// Lifecycle of the single connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Handshaking,
    Connected,
}

#[derive(Default)]
struct Link {
    endpoint: Option<WsUrl>,
    transport: Option<Arc<dyn Transport>>,
    receiver: Option<JoinHandle<()>>,
}

/// One connection shared by every task, with a background receive thread
/// feeding an inbound FIFO.
///
/// `connected` drops to false as soon as the peer goes away, but `running`
/// stays set until [`WebSocketClient::disconnect`], so a dropped connection
/// must be disconnected before connecting again.
pub struct WebSocketClient {
    config: ClientConfig,
    link: Mutex<Link>,
    phase: Mutex<ConnectionState>,
    connected: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    queue: Arc<Mutex<VecDeque<String>>>,
}

impl WebSocketClient {
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            link: Mutex::new(Link::default()),
            phase: Mutex::new(ConnectionState::Disconnected),
            connected: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
            queue: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Connect to `url`; false on any failure
    pub fn connect(&self, url: &str) -> bool {
        match self.try_connect(url) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(%url, error = %e, "WebSocket connect failed");
                false
            }
        }
    }

    pub fn try_connect(&self, url: &str) -> Result<(), WsError> {
        let mut link = self.link.lock_or_recover();
        if self.connected.load(Ordering::SeqCst) || self.running.load(Ordering::SeqCst) {
            return Err(WsError::AlreadyConnected);
        }

        let endpoint = WsUrl::parse(url)?;
        tracing::info!(
            host = %endpoint.host,
            port = endpoint.port,
            path = %endpoint.path,
            "WebSocket connecting"
        );

        self.set_phase(ConnectionState::Connecting);
        let transport = match connect_tcp(&endpoint.host, endpoint.port, self.config.connect_timeout)
            .and_then(|stream| {
                self.set_phase(ConnectionState::Handshaking);
                establish(&endpoint, stream, &self.config)
            }) {
            Ok(transport) => transport,
            Err(e) => {
                self.set_phase(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        self.connected.store(true, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);

        let receiver = {
            let transport = Arc::clone(&transport);
            let connected = Arc::clone(&self.connected);
            let running = Arc::clone(&self.running);
            let queue = Arc::clone(&self.queue);
            std::thread::Builder::new()
                .name("ws-receive".to_string())
                .spawn(move || receive_loop(transport.as_ref(), &connected, &running, &queue))
        };
        let receiver = match receiver {
            Ok(handle) => handle,
            Err(e) => {
                transport.close();
                self.connected.store(false, Ordering::SeqCst);
                self.running.store(false, Ordering::SeqCst);
                self.set_phase(ConnectionState::Disconnected);
                return Err(WsError::Io(e));
            }
        };

        tracing::info!(
            host = %endpoint.host,
            port = endpoint.port,
            scheme = transport.scheme().as_str(),
            "WebSocket connected"
        );
        link.endpoint = Some(endpoint);
        link.transport = Some(transport);
        link.receiver = Some(receiver);
        self.set_phase(ConnectionState::Connected);
        Ok(())
    }

    /// Send a text message; false if not connected or the write fails
    pub fn send(&self, message: &str) -> bool {
        match self.try_send(message) {
            Ok(()) => true,
            Err(WsError::NotConnected) => false,
            Err(e) => {
                tracing::warn!(error = %e, "WebSocket send failed");
                false
            }
        }
    }

    pub fn try_send(&self, message: &str) -> Result<(), WsError> {
        if !self.is_connected() {
            return Err(WsError::NotConnected);
        }
        let transport = self
            .link
            .lock_or_recover()
            .transport
            .clone()
            .ok_or(WsError::NotConnected)?;
        transport.send_text(message)
    }

    /// Pop the oldest inbound message, if any
    pub fn receive(&self) -> Option<String> {
        self.queue.lock_or_recover().pop_front()
    }

    /// Close the connection and join the receive thread. Safe to call repeatedly.
    pub fn disconnect(&self) {
        let mut link = self.link.lock_or_recover();
        if !self.connected.load(Ordering::SeqCst) && !self.running.load(Ordering::SeqCst) {
            return;
        }

        self.running.store(false, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);

        if let Some(transport) = link.transport.take() {
            transport.close();
        }
        if let Some(receiver) = link.receiver.take() {
            if receiver.join().is_err() {
                tracing::warn!("WebSocket receive thread panicked");
            }
        }
        self.set_phase(ConnectionState::Disconnected);

        if let Some(endpoint) = &link.endpoint {
            tracing::info!(host = %endpoint.host, port = endpoint.port, "WebSocket disconnected");
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        let phase = *self.phase.lock_or_recover();
        if phase == ConnectionState::Connected && !self.is_connected() {
            ConnectionState::Disconnected
        } else {
            phase
        }
    }

    /// The most recently connected endpoint
    #[must_use]
    pub fn endpoint(&self) -> Option<WsUrl> {
        self.link.lock_or_recover().endpoint.clone()
    }

    /// Number of queued inbound messages
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.lock_or_recover().len()
    }

    fn set_phase(&self, phase: ConnectionState) {
        *self.phase.lock_or_recover() = phase;
    }
}

impl Default for WebSocketClient {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl Drop for WebSocketClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn receive_loop(
    transport: &dyn Transport,
    connected: &AtomicBool,
    running: &AtomicBool,
    queue: &Mutex<VecDeque<String>>,
) {
    tracing::debug!("Receive thread started");
    while running.load(Ordering::SeqCst) && connected.load(Ordering::SeqCst) {
        match transport.receive() {
            Ok(messages) => {
                let mut queue = queue.lock_or_recover();
                queue.extend(messages.into_iter().filter(|m| !m.is_empty()));
            }
            Err(e) => {
                if !running.load(Ordering::SeqCst) {
                    tracing::debug!(error = %e, "Receive loop stopped by disconnect");
                } else if e.is_closed() {
                    tracing::info!(error = %e, "WebSocket connection closed");
                } else {
                    tracing::warn!(error = %e, "WebSocket receive failed");
                }
                connected.store(false, Ordering::SeqCst);
                break;
            }
        }
    }
    tracing::debug!("Receive thread stopped");
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::frame::{self, Frame, Opcode};

    fn serve<F>(handler: F) -> (u16, thread::JoinHandle<()>)
    where
        F: FnOnce(TcpStream) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            handler(stream);
        });
        (port, handle)
    }

    fn read_head(stream: &mut TcpStream) -> String {
        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            if stream.read(&mut byte).unwrap() == 0 {
                break;
            }
            head.push(byte[0]);
        }
        String::from_utf8(head).unwrap()
    }

    fn accept_upgrade(stream: &mut TcpStream) -> String {
        let request = read_head(stream);
        stream
            .write_all(
                b"HTTP/1.1 101 Switching Protocols\r\n\
                  Upgrade: websocket\r\n\
                  Connection: Upgrade\r\n\r\n",
            )
            .unwrap();
        request
    }

    /// Read one frame, or None once the client hangs up
    fn read_frame(stream: &mut TcpStream, buffer: &mut Vec<u8>) -> Option<Frame> {
        let mut chunk = [0u8; 1024];
        loop {
            if let Some((frame, used)) = frame::decode_frame(buffer) {
                buffer.drain(..used);
                return Some(frame);
            }
            match stream.read(&mut chunk) {
                Ok(0) | Err(_) => return None,
                Ok(n) => buffer.extend_from_slice(&chunk[..n]),
            }
        }
    }

    fn wait_for<T>(mut poll: impl FnMut() -> Option<T>) -> Option<T> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Some(value) = poll() {
                return Some(value);
            }
            thread::sleep(Duration::from_millis(5));
        }
        None
    }

    #[test]
    fn echo_round_trip() {
        let (port, server) = serve(|mut stream| {
            let request = accept_upgrade(&mut stream);
            assert!(request.starts_with("GET /echo HTTP/1.1\r\n"));
            let mut buffer = Vec::new();
            while let Some(frame) = read_frame(&mut stream, &mut buffer) {
                assert!(frame.masked);
                if frame.kind() == Some(Opcode::Text) {
                    let reply = frame::encode_frame(Opcode::Text, &frame.payload, None);
                    stream.write_all(&reply).unwrap();
                }
            }
        });

        let client = WebSocketClient::default();
        assert!(client.connect(&format!("ws://127.0.0.1:{port}/echo")));
        assert!(client.is_connected());
        assert_eq!(client.state(), ConnectionState::Connected);
        assert_eq!(client.endpoint().unwrap().port, port);

        assert!(client.send("hello"));
        assert_eq!(wait_for(|| client.receive()).as_deref(), Some("hello"));
        assert_eq!(client.receive(), None);

        client.disconnect();
        assert!(!client.is_connected());
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(!client.send("late"));
        server.join().unwrap();
    }

    #[test]
    fn malformed_url_fails_without_state_change() {
        let client = WebSocketClient::default();
        assert!(!client.connect("ws://"));
        assert!(!client.is_connected());
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(client.endpoint().is_none());
    }

    #[test]
    fn second_connect_is_rejected() {
        let (port, server) = serve(|mut stream| {
            accept_upgrade(&mut stream);
            let mut buffer = Vec::new();
            while read_frame(&mut stream, &mut buffer).is_some() {}
        });

        let client = WebSocketClient::default();
        let url = format!("ws://127.0.0.1:{port}/");
        assert!(client.connect(&url));
        assert!(matches!(client.try_connect(&url), Err(WsError::AlreadyConnected)));
        client.disconnect();
        server.join().unwrap();
    }

    #[test]
    fn rejected_handshake_leaves_client_reusable() {
        let (port, server) = serve(|mut stream| {
            read_head(&mut stream);
            stream.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").unwrap();
        });

        let client = WebSocketClient::default();
        assert!(!client.connect(&format!("127.0.0.1:{port}")));
        assert!(!client.is_connected());
        assert_eq!(client.state(), ConnectionState::Disconnected);
        server.join().unwrap();
    }

    #[test]
    fn server_close_drops_connection() {
        let (port, server) = serve(|mut stream| {
            accept_upgrade(&mut stream);
            let mut message = frame::encode_frame(Opcode::Text, b"bye", None);
            message.extend(frame::encode_frame(Opcode::Close, &[], None));
            stream.write_all(&message).unwrap();
        });

        let client = WebSocketClient::default();
        assert!(client.connect(&format!("ws://127.0.0.1:{port}")));
        assert!(wait_for(|| (!client.is_connected()).then_some(())).is_some());
        assert_eq!(client.receive().as_deref(), Some("bye"));
        assert!(!client.send("anyone?"));
        assert_eq!(client.state(), ConnectionState::Disconnected);

        // still running until explicitly disconnected
        assert!(matches!(
            client.try_connect(&format!("ws://127.0.0.1:{port}")),
            Err(WsError::AlreadyConnected)
        ));
        client.disconnect();
        server.join().unwrap();
    }

    #[test]
    fn fragments_are_joined_and_pings_answered() {
        let (port, server) = serve(|mut stream| {
            accept_upgrade(&mut stream);
            let mut first = frame::encode_frame(Opcode::Text, b"frag", None);
            first[0] &= !frame::FIN_BIT;
            let mut batch = first;
            batch.extend(frame::encode_frame(Opcode::Ping, b"p1", None));
            batch.extend(frame::encode_frame(Opcode::Continuation, b"mented", None));
            batch.extend(frame::encode_frame(Opcode::Text, b"", None));
            stream.write_all(&batch).unwrap();

            let mut buffer = Vec::new();
            let pong = read_frame(&mut stream, &mut buffer).unwrap();
            assert_eq!(pong.kind(), Some(Opcode::Pong));
            assert_eq!(pong.payload, b"p1");
            while read_frame(&mut stream, &mut buffer).is_some() {}
        });

        let client = WebSocketClient::default();
        assert!(client.connect(&format!("ws://127.0.0.1:{port}/")));
        assert_eq!(wait_for(|| client.receive()).as_deref(), Some("fragmented"));
        // empty messages are never queued
        thread::sleep(Duration::from_millis(50));
        assert_eq!(client.pending(), 0);
        client.disconnect();
        server.join().unwrap();
    }

    #[test]
    fn large_frame_split_across_reads() {
        let (port, server) = serve(|mut stream| {
            accept_upgrade(&mut stream);
            let big = frame::encode_frame(Opcode::Text, &[b'x'; 70_000], None);
            for chunk in big.chunks(1000) {
                stream.write_all(chunk).unwrap();
                stream.flush().unwrap();
                thread::sleep(Duration::from_millis(1));
            }
            let medium = frame::encode_frame(Opcode::Text, &[b'y'; 200], None);
            let (head, tail) = medium.split_at(3);
            stream.write_all(head).unwrap();
            thread::sleep(Duration::from_millis(20));
            stream.write_all(tail).unwrap();

            let mut buffer = Vec::new();
            while read_frame(&mut stream, &mut buffer).is_some() {}
        });

        let client = WebSocketClient::default();
        assert!(client.connect(&format!("ws://127.0.0.1:{port}/")));
        let first = wait_for(|| client.receive()).unwrap();
        assert_eq!(first.len(), 70_000);
        assert!(first.bytes().all(|b| b == b'x'));
        let second = wait_for(|| client.receive()).unwrap();
        assert_eq!(second, "y".repeat(200));
        assert!(client.is_connected());
        client.disconnect();
        server.join().unwrap();
    }

    #[test]
    fn oversized_frame_drops_connection() {
        let (port, server) = serve(|mut stream| {
            accept_upgrade(&mut stream);
            let mut header = vec![0x82, 127];
            header.extend_from_slice(&(1u64 << 62).to_be_bytes());
            stream.write_all(&header).unwrap();
            let mut buffer = Vec::new();
            while read_frame(&mut stream, &mut buffer).is_some() {}
        });

        let client = WebSocketClient::new(ClientConfig {
            max_message_size: 1024,
            ..ClientConfig::default()
        });
        assert!(client.connect(&format!("ws://127.0.0.1:{port}/")));
        assert!(wait_for(|| (!client.is_connected()).then_some(())).is_some());
        assert_eq!(client.pending(), 0);
        client.disconnect();
        server.join().unwrap();
    }

    #[test]
    fn secure_scheme_against_plain_server_fails_cleanly() {
        let (port, server) = serve(|mut stream| {
            let _ = stream.write_all(b"HTTP/1.1 101 Switching Protocols\r\n\r\n");
            let mut sink = [0u8; 1024];
            while matches!(stream.read(&mut sink), Ok(n) if n > 0) {}
        });

        let client = WebSocketClient::new(ClientConfig {
            connect_timeout: Duration::from_secs(2),
            ..ClientConfig::default()
        });
        let result = client.try_connect(&format!("wss://127.0.0.1:{port}/"));
        assert!(matches!(result, Err(WsError::Handshake(_))), "{result:?}");
        assert!(!client.is_connected());
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(client.endpoint().is_none());
        drop(client);
        server.join().unwrap();
    }

    #[test]
    fn send_without_connection() {
        let client = WebSocketClient::default();
        assert!(matches!(client.try_send("x"), Err(WsError::NotConnected)));
        assert!(!client.send("x"));
    }

    #[test]
    fn disconnect_is_idempotent() {
        let client = WebSocketClient::default();
        client.disconnect();
        client.disconnect();
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }
}
