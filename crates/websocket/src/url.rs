//! WebSocket URL parsing

use std::fmt;

use crate::WsError;

/// Transport selected by the URL scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// `ws://` or no scheme
    Plain,
    /// `wss://`
    Secure,
}

impl Scheme {
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Plain => 80,
            Self::Secure => 443,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "ws",
            Self::Secure => "wss",
        }
    }
}

/// Port used when an explicit port cannot be parsed
pub const FALLBACK_PORT: u16 = 80;

/// A parsed `[ws://|wss://]host[:port][/path]` endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsUrl {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl WsUrl {
    pub fn parse(url: &str) -> Result<Self, WsError> {
        let url = url.trim();
        let (scheme, rest) = if let Some(rest) = url.strip_prefix("wss://") {
            (Scheme::Secure, rest)
        } else if let Some(rest) = url.strip_prefix("ws://") {
            (Scheme::Plain, rest)
        } else {
            (Scheme::Plain, url)
        };

        let (host_port, path) = match rest.find('/') {
            Some(slash) => (&rest[..slash], &rest[slash..]),
            None => (rest, "/"),
        };

        let (host, port) = match split_port(host_port) {
            Some((host, port)) => (host, parse_port(port)),
            None => (host_port, scheme.default_port()),
        };

        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            return Err(WsError::InvalidUrl(url.to_string()));
        }

        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }

    /// `host:port` as sent in the `Host` header
    #[must_use]
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for WsUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme.as_str(), self.authority(), self.path)
    }
}

/// Split on the last colon, leaving bracketed IPv6 literals intact
fn split_port(host_port: &str) -> Option<(&str, &str)> {
    let colon = host_port.rfind(':')?;
    if host_port.starts_with('[') && !host_port[..colon].ends_with(']') {
        return None;
    }
    Some((&host_port[..colon], &host_port[colon + 1..]))
}

/// Leading digits as a port number, falling back to 80
fn parse_port(text: &str) -> u16 {
    let digits: String = text.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(FALLBACK_PORT)
}
