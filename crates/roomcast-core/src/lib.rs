//! # roomcast-core
//!
//! Connection tracking, room membership and broadcast routing for the
//! Roomcast chat relay.
//!
//! - **ConnectionRegistry** - the set of live connection handles
//! - **RoomDirectory** - room membership, with a reverse index per connection
//! - **BroadcastRouter** - turns one inbound event into deliveries
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────────┐     ┌───────────────┐
//! │  Transport  │────▶│ BroadcastRouter │────▶│ RoomDirectory │
//! └─────────────┘     └─────────────────┘     └───────────────┘
//!        ▲                 │         │
//!        │   Outbound      │         ▼
//!        └─────────────────┘  ┌────────────────────┐
//!                             │ ConnectionRegistry │
//!                             └────────────────────┘
//! ```

pub mod registry;
pub mod room;
pub mod router;

pub use registry::ConnectionRegistry;
pub use room::{DirectoryStats, RoomDirectory};
pub use router::{BroadcastRouter, Delivery, DeliveryReport, RouterConfig, RouterStats};
