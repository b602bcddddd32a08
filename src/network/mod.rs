//! TCP overlay: sessions, peers, the gossip protocol and the host.

pub mod host;
pub mod peer;
pub mod protocol;
pub mod session;

use peerchain_derive::{BinaryCodec, Error};
use std::fmt;
use std::net::SocketAddr;

/// Errors raised by the networking layer. Always per-session: a failing
/// session is closed and the rest of the overlay is unaffected.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Dialing a remote endpoint failed.
    #[error("failed to connect to {0}: {1}")]
    ConnectFailed(String, String),
    /// The session is closed; no further frames can be exchanged.
    #[error("session closed")]
    SessionClosed,
    /// A frame length field exceeded the protocol maximum.
    #[error("oversized frame: {0} bytes")]
    FrameTooLarge(usize),
    /// A frame violated the framing rules, e.g. a zero-length payload.
    #[error("malformed frame: {0}")]
    BadFrame(String),
    /// Socket-level failure.
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for NetworkError {
    fn from(value: std::io::Error) -> Self {
        NetworkError::Io(value.to_string())
    }
}

/// A dialable network location.
///
/// Kept as host string + port so peers can advertise names as well as
/// literal addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, BinaryCodec)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parses `"host:port"`.
    pub fn parse(s: &str) -> Option<Endpoint> {
        let (host, port) = s.rsplit_once(':')?;
        let port = port.parse().ok()?;
        if host.is_empty() {
            return None;
        }
        Some(Endpoint::new(host, port))
    }

    /// Same host, different port.
    pub fn with_port(&self, port: u16) -> Endpoint {
        Endpoint::new(self.host.clone(), port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Endpoint::new(addr.ip().to_string(), addr.port())
    }
}
