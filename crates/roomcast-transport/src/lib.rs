//! # roomcast-transport
//!
//! Transport boundary for the Roomcast chat relay.
//!
//! - [`ConnectionId`] - opaque handle for one live client session
//! - [`Outbound`] - the send seam the router delivers through
//! - [`Mailboxes`] - bounded per-connection queues implementing [`Outbound`]
//!
//! ```rust,ignore
//! use roomcast_transport::{ConnectionId, Mailboxes, MailboxConfig};
//!
//! let mailboxes = Mailboxes::new(MailboxConfig::default());
//! let id = ConnectionId::generate();
//! let mut rx = mailboxes.open(id.clone(), Encoding::Json);
//! while let Some(outgoing) = rx.recv().await {
//!     // write to the socket
//! }
//! ```

pub mod mailbox;
pub mod traits;

pub use mailbox::{MailboxConfig, Mailboxes, Outgoing};
pub use traits::{ConnectionId, Outbound, TransportError};
