//! Transport abstraction traits for Roomcast.
//!
//! The router never touches sockets. It only knows connection handles and
//! an [`Outbound`] implementation that can push an event to one of them.

use async_trait::async_trait;
use roomcast_protocol::Event;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Create a new connection ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a connection ID that is unique for the life of the process.
    #[must_use]
    pub fn generate() -> Self {
        let n = NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{:x}", n))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The peer did not accept data in time.
    #[error("Send timed out")]
    Timeout,

    /// No connection with this ID is known to the transport.
    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] roomcast_protocol::ProtocolError),
}

/// Outbound side of the transport.
///
/// Implementations must bound every call: a slow or vanished peer yields an
/// error instead of stalling the caller.
#[async_trait]
pub trait Outbound: Send + Sync {
    /// Encode and send an event to one connection.
    async fn send(&self, to: &ConnectionId, event: &Event) -> Result<(), TransportError>;

    /// Ask the transport to close a connection with a final notice.
    async fn close(&self, to: &ConnectionId, reason: &str) -> Result<(), TransportError>;
}
