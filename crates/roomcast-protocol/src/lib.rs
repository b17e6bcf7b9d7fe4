//! # roomcast-protocol
//!
//! Wire protocol definitions for the Roomcast chat relay.
//!
//! Clients exchange a single structure, the [`Event`]:
//!
//! - `JOIN` - enter a room
//! - `LEAVE` - exit a room
//! - `MESSAGE` - send text to everyone in a room
//!
//! Events travel as JSON text frames or as length-prefixed MessagePack
//! binary frames.
//!
//! ## Example
//!
//! ```rust
//! use roomcast_protocol::{codec, Event};
//!
//! let event = Event::message(7, "alice", "hi");
//!
//! let text = codec::encode_json(&event).unwrap();
//! assert_eq!(codec::decode_json(&text).unwrap(), event);
//!
//! let binary = codec::encode(&event).unwrap();
//! assert_eq!(codec::decode(&binary).unwrap(), event);
//! ```

pub mod codec;
pub mod event;

pub use codec::{decode, decode_json, encode, encode_json, Encoding, ProtocolError, WireFrame};
pub use event::{Event, EventKind, RoomId};
