//! HTTP/1.1 upgrade handshake for plain connections

use std::io::{Read, Write};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;

use crate::{WsError, WsUrl};

/// Upper bound on the size of the server's response head
pub const MAX_RESPONSE_HEAD: usize = 8192;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Random 16-byte nonce, base64 encoded
#[must_use]
pub fn generate_key() -> String {
    let mut nonce = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut nonce);
    STANDARD.encode(nonce)
}

/// Build the upgrade request for `url`
#[must_use]
pub fn build_request(url: &WsUrl, key: &str) -> String {
    format!(
        "GET {} HTTP/1.1\r\n\
         Host: {}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n",
        url.path,
        url.authority(),
        key
    )
}

/// The only acceptance check applied to the response
#[must_use]
pub fn is_switching_protocols(response: &str) -> bool {
    response.contains("101 Switching Protocols")
}

/// Run the handshake over `stream`.
///
/// Returns any bytes the server sent after the response head, which belong
/// to the first frames.
pub fn perform<S: Read + Write>(stream: &mut S, url: &WsUrl) -> Result<Vec<u8>, WsError> {
    let request = build_request(url, &generate_key());
    stream.write_all(request.as_bytes())?;
    stream.flush()?;

    let mut response = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    let head_end = loop {
        if let Some(pos) = find_terminator(&response) {
            break pos;
        }
        if response.len() >= MAX_RESPONSE_HEAD {
            return Err(WsError::Handshake("response head too large".to_string()));
        }
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            return Err(WsError::Handshake(
                "connection closed during handshake".to_string(),
            ));
        }
        response.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&response[..head_end]);
    if !is_switching_protocols(&head) {
        let status = head.lines().next().unwrap_or_default().to_string();
        return Err(WsError::Handshake(status));
    }

    Ok(response.split_off(head_end + HEAD_TERMINATOR.len()))
}

fn find_terminator(data: &[u8]) -> Option<usize> {
    data.windows(HEAD_TERMINATOR.len())
        .position(|w| w == HEAD_TERMINATOR)
}
