//! Plain TCP transport with in-crate framing

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Mutex;

use crate::frame::{self, Opcode};
use crate::sync::MutexExt;
use crate::transport::as_timeout;
use crate::{ClientConfig, Scheme, Transport, WsError, WsUrl, handshake};

struct ReadState {
    stream: TcpStream,
    /// Bytes read but not yet decoded into whole frames
    pending: Vec<u8>,
    /// Payload of an unfinished fragmented message
    fragments: Option<Vec<u8>>,
    /// Close frame seen; the next receive reports it
    closed: bool,
}

/// `ws://` transport
pub struct PlainTransport {
    writer: Mutex<TcpStream>,
    reader: Mutex<ReadState>,
    /// Used to shut the socket down without taking either lock
    control: TcpStream,
    read_buffer: usize,
    max_message_size: usize,
}

impl PlainTransport {
    /// Upgrade an open TCP stream
    pub fn handshake(
        url: &WsUrl,
        mut stream: TcpStream,
        config: &ClientConfig,
    ) -> Result<Self, WsError> {
        stream.set_read_timeout(as_timeout(config.connect_timeout))?;
        let leftover = handshake::perform(&mut stream, url)?;
        stream.set_read_timeout(None)?;
        let _ = stream.set_nodelay(true);

        let reader = stream.try_clone()?;
        let control = stream.try_clone()?;
        Ok(Self {
            writer: Mutex::new(stream),
            reader: Mutex::new(ReadState {
                stream: reader,
                pending: leftover,
                fragments: None,
                closed: false,
            }),
            control,
            read_buffer: config.read_buffer.max(1),
            max_message_size: config.max_message_size,
        })
    }

    fn write_frame(&self, bytes: &[u8]) -> Result<(), WsError> {
        let mut writer = self.writer.lock_or_recover();
        writer.write_all(bytes)?;
        writer.flush()?;
        Ok(())
    }

    /// Decode every whole frame buffered in `state`.
    ///
    /// Fails as soon as a frame header or a fragmented message announces more
    /// than `max_message_size` bytes, before that payload is buffered.
    fn drain(&self, state: &mut ReadState, messages: &mut Vec<String>) -> Result<(), WsError> {
        while !state.closed {
            let Some(header) = frame::decode_header(&state.pending) else {
                break;
            };
            let buffered = if header.opcode == Opcode::Continuation as u8 {
                state.fragments.as_ref().map_or(0, Vec::len) as u64
            } else {
                0
            };
            let len = header.payload_len.saturating_add(buffered);
            if len > self.max_message_size as u64 {
                return Err(WsError::MessageTooLarge {
                    len,
                    max: self.max_message_size,
                });
            }

            let Some((frame, used)) = frame::decode_frame(&state.pending) else {
                break;
            };
            state.pending.drain(..used);

            match frame.kind() {
                Some(Opcode::Text | Opcode::Binary) => {
                    if frame.fin {
                        messages.push(String::from_utf8_lossy(&frame.payload).into_owned());
                    } else {
                        state.fragments = Some(frame.payload);
                    }
                }
                Some(Opcode::Continuation) => {
                    let Some(buffer) = state.fragments.as_mut() else {
                        tracing::debug!("Continuation frame without a started message");
                        continue;
                    };
                    buffer.extend_from_slice(&frame.payload);
                    if frame.fin {
                        if let Some(whole) = state.fragments.take() {
                            messages.push(String::from_utf8_lossy(&whole).into_owned());
                        }
                    }
                }
                Some(Opcode::Ping) => {
                    if let Err(e) = self.write_frame(&frame::encode_control(Opcode::Pong, &frame.payload)) {
                        tracing::debug!(error = %e, "Failed to answer ping");
                    }
                }
                Some(Opcode::Pong) => {}
                Some(Opcode::Close) => {
                    tracing::debug!("Server sent close frame");
                    state.closed = true;
                }
                None => tracing::debug!(opcode = frame.opcode, "Ignoring frame with unknown opcode"),
            }
        }
        Ok(())
    }
}

impl Transport for PlainTransport {
    fn scheme(&self) -> Scheme {
        Scheme::Plain
    }

    fn send_text(&self, message: &str) -> Result<(), WsError> {
        self.write_frame(&frame::encode_text(message))
    }

    fn receive(&self) -> Result<Vec<String>, WsError> {
        let mut state = self.reader.lock_or_recover();
        let mut messages = Vec::new();

        // Frames left over from the handshake or a previous read
        self.drain(&mut state, &mut messages)?;

        if messages.is_empty() && !state.closed {
            let mut buf = vec![0u8; self.read_buffer];
            let n = state.stream.read(&mut buf)?;
            if n == 0 {
                return Err(WsError::Closed);
            }
            state.pending.extend_from_slice(&buf[..n]);
            self.drain(&mut state, &mut messages)?;
        }

        if messages.is_empty() && state.closed {
            return Err(WsError::Closed);
        }
        Ok(messages)
    }

    fn close(&self) {
        if let Err(e) = self.write_frame(&frame::encode_control(Opcode::Close, &[])) {
            tracing::debug!(error = %e, "Close frame not sent");
        }
        let _ = self.control.shutdown(Shutdown::Both);
    }
}
