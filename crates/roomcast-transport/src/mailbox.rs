//! Bounded per-connection outbound queues.
//!
//! Each connection owns a mailbox drained by its writer task. Sending to a
//! connection only enqueues, waiting at most `send_timeout` for room in the
//! queue, so a slow socket never blocks the sender for long.

use async_trait::async_trait;
use dashmap::DashMap;
use roomcast_protocol::{codec, Encoding, Event, WireFrame};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::SendTimeoutError, error::TrySendError};
use tracing::{debug, trace};

use crate::traits::{ConnectionId, Outbound, TransportError};

/// Mailbox configuration.
#[derive(Debug, Clone)]
pub struct MailboxConfig {
    /// Queue capacity per connection.
    pub capacity: usize,
    /// How long a send may wait for queue capacity.
    pub send_timeout: Duration,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            send_timeout: Duration::from_millis(500),
        }
    }
}

/// Item queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// An encoded event.
    Frame(WireFrame),
    /// Close the socket with this reason.
    Close(String),
}

struct Slot {
    tx: mpsc::Sender<Outgoing>,
    encoding: Encoding,
}

/// Registry of connection mailboxes.
pub struct Mailboxes {
    slots: DashMap<ConnectionId, Slot>,
    config: MailboxConfig,
}

impl Mailboxes {
    /// Create an empty mailbox registry.
    #[must_use]
    pub fn new(config: MailboxConfig) -> Self {
        Self {
            slots: DashMap::new(),
            config,
        }
    }

    /// Open a mailbox for a connection.
    ///
    /// Returns the receiving end for the connection's writer task. Opening
    /// an ID twice replaces the previous mailbox.
    pub fn open(&self, id: ConnectionId, encoding: Encoding) -> mpsc::Receiver<Outgoing> {
        let (tx, rx) = mpsc::channel(self.config.capacity.max(1));
        debug!(connection = %id, ?encoding, "Mailbox opened");
        self.slots.insert(id, Slot { tx, encoding });
        rx
    }

    /// Drop a connection's mailbox.
    ///
    /// Returns `true` if a mailbox existed.
    pub fn remove(&self, id: &ConnectionId) -> bool {
        self.slots.remove(id).is_some()
    }

    /// Number of open mailboxes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no mailbox is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn sender(&self, id: &ConnectionId) -> Result<(mpsc::Sender<Outgoing>, Encoding), TransportError> {
        self.slots
            .get(id)
            .map(|slot| (slot.tx.clone(), slot.encoding))
            .ok_or_else(|| TransportError::UnknownConnection(id.clone()))
    }
}

impl Default for Mailboxes {
    fn default() -> Self {
        Self::new(MailboxConfig::default())
    }
}

#[async_trait]
impl Outbound for Mailboxes {
    async fn send(&self, to: &ConnectionId, event: &Event) -> Result<(), TransportError> {
        let (tx, encoding) = self.sender(to)?;
        let frame = codec::encode_as(event, encoding)?;
        trace!(connection = %to, bytes = frame.len(), "Enqueue frame");

        tx.send_timeout(Outgoing::Frame(frame), self.config.send_timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => TransportError::Timeout,
                SendTimeoutError::Closed(_) => TransportError::ConnectionClosed,
            })
    }

    async fn close(&self, to: &ConnectionId, reason: &str) -> Result<(), TransportError> {
        let (tx, _) = self.sender(to)?;

        tx.try_send(Outgoing::Close(reason.to_string()))
            .map_err(|e| match e {
                TrySendError::Full(_) => TransportError::SendFailed("mailbox full".to_string()),
                TrySendError::Closed(_) => TransportError::ConnectionClosed,
            })
    }
}
