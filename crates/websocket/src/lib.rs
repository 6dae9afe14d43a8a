//! Threadscript WebSocket Client
//!
//! A blocking RFC 6455 client shared by every task in the process.
//!
//! Transport support:
//! - `ws://` and bare `host[:port][/path]`: plain TCP with the handshake and
//!   framing implemented here
//! - `wss://`: TLS, with handshake and framing delegated to `tungstenite`
//!
//! Both transports feed the same receive thread and inbound message queue,
//! so callers cannot tell them apart.

mod client;
mod error;
pub mod frame;
pub mod handshake;
mod plain;
mod secure;
mod sync;
mod transport;
mod url;

pub use client::*;
pub use error::*;
pub use plain::PlainTransport;
pub use secure::SecureTransport;
pub use transport::*;
pub use url::*;
