//! Event types for the Roomcast protocol.
//!
//! An event is the only structure exchanged with clients. The same shape is
//! used inbound (what a client asks for) and outbound (what members receive).

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// A room identifier.
pub type RoomId = i64;

/// Event kind.
///
/// Kinds the relay does not know are kept verbatim in [`EventKind::Other`]
/// and routed like [`EventKind::Message`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    /// Join a room.
    Join,
    /// Leave a room.
    Leave,
    /// Plain message to a room.
    Message,
    /// Unrecognized kind, forwarded as received.
    Other(String),
}

impl EventKind {
    /// Wire name of this kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Join => "JOIN",
            EventKind::Leave => "LEAVE",
            EventKind::Message => "MESSAGE",
            EventKind::Other(kind) => kind,
        }
    }
}

impl From<String> for EventKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "JOIN" => EventKind::Join,
            "LEAVE" => EventKind::Leave,
            "MESSAGE" => EventKind::Message,
            _ => EventKind::Other(value),
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> String {
        match kind {
            EventKind::Other(kind) => kind,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chat event.
///
/// Decoding accepts `type` for `kind` and `roomNumber` for `roomId`, which
/// older clients send. `sender` and `message` may be absent or `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// What the event asks for.
    #[serde(alias = "type")]
    pub kind: EventKind,
    /// Target room.
    #[serde(alias = "roomNumber")]
    pub room_id: RoomId,
    /// Free-form sender label chosen by the client.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub sender: String,
    /// Body text.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub message: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Event {
    /// Create a new event.
    #[must_use]
    pub fn new(
        kind: EventKind,
        room_id: RoomId,
        sender: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            room_id,
            sender: sender.into(),
            message: message.into(),
        }
    }

    /// Create a JOIN event.
    #[must_use]
    pub fn join(room_id: RoomId, sender: impl Into<String>) -> Self {
        Self::new(EventKind::Join, room_id, sender, "")
    }

    /// Create a LEAVE event.
    #[must_use]
    pub fn leave(room_id: RoomId, sender: impl Into<String>) -> Self {
        Self::new(EventKind::Leave, room_id, sender, "")
    }

    /// Create a MESSAGE event.
    #[must_use]
    pub fn message(room_id: RoomId, sender: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(EventKind::Message, room_id, sender, body)
    }

    /// Replace the body text.
    #[must_use]
    pub fn with_message(mut self, body: impl Into<String>) -> Self {
        self.message = body.into();
        self
    }
}
