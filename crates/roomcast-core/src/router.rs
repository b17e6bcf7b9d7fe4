//! Broadcast router for Roomcast.
//!
//! The router owns the connection registry and the room directory. For each
//! inbound event it updates membership, snapshots the delivery set and hands
//! the outbound event to the transport, one send per recipient. Sends happen
//! after every lock has been released.

use crate::registry::ConnectionRegistry;
use crate::room::{DirectoryStats, RoomDirectory};
use futures_util::future::join_all;
use roomcast_protocol::{Event, EventKind, RoomId};
use roomcast_transport::{ConnectionId, Outbound, TransportError};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Body of the notice broadcast when a member joins.
    pub join_notice: String,
    /// Body of the notice broadcast when a member leaves.
    pub leave_notice: String,
    /// Reason sent to a connection as it is dropped.
    pub close_reason: String,
    /// Broadcast a leave notice to each room a disconnecting member was in.
    pub announce_disconnect: bool,
    /// Whether to auto-delete empty rooms.
    pub auto_delete_empty_rooms: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            join_notice: "member joined".to_string(),
            leave_notice: "member left".to_string(),
            close_reason: "connection closed".to_string(),
            announce_disconnect: false,
            auto_delete_empty_rooms: true,
        }
    }
}

/// An outbound event together with the connections that should receive it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// The event to send.
    pub event: Event,
    /// Delivery set, captured after any membership change.
    pub recipients: Vec<ConnectionId>,
}

/// Outcome of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    /// Kind of the routed event.
    pub kind: String,
    /// Target room.
    pub room_id: RoomId,
    /// Size of the delivery set.
    pub recipients: usize,
    /// Sends that succeeded.
    pub delivered: usize,
    /// Sends that failed.
    pub failed: usize,
}

impl DeliveryReport {
    fn empty(event: &Event) -> Self {
        Self {
            kind: event.kind.to_string(),
            room_id: event.room_id,
            recipients: 0,
            delivered: 0,
            failed: 0,
        }
    }
}

/// The broadcast router.
pub struct BroadcastRouter {
    registry: ConnectionRegistry,
    directory: RoomDirectory,
    outbound: Arc<dyn Outbound>,
    config: RouterConfig,
}

impl BroadcastRouter {
    /// Create a new router with default configuration.
    #[must_use]
    pub fn new(outbound: Arc<dyn Outbound>) -> Self {
        Self::with_config(RouterConfig::default(), outbound)
    }

    /// Create a new router with custom configuration.
    #[must_use]
    pub fn with_config(config: RouterConfig, outbound: Arc<dyn Outbound>) -> Self {
        info!("Creating router with config: {:?}", config);
        Self {
            registry: ConnectionRegistry::new(),
            directory: RoomDirectory::with_auto_delete(config.auto_delete_empty_rooms),
            outbound,
            config,
        }
    }

    /// The connection registry.
    #[must_use]
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// The room directory.
    #[must_use]
    pub fn directory(&self) -> &RoomDirectory {
        &self.directory
    }

    /// Router statistics.
    #[must_use]
    pub fn stats(&self) -> RouterStats {
        RouterStats {
            connection_count: self.registry.len(),
            rooms: self.directory.stats(),
        }
    }

    /// Register a newly accepted connection.
    pub fn connect(&self, id: ConnectionId) -> bool {
        self.registry.add(id)
    }

    /// Apply an event's membership change and compute its delivery.
    ///
    /// Nothing is sent. Returns `None` if the origin is not an open
    /// connection. The check for a join is made under the origin's
    /// membership lock, so a join racing the origin's teardown is refused.
    pub fn route(&self, origin: &ConnectionId, event: Event) -> Option<Delivery> {
        let room = event.room_id;

        let event = match event.kind {
            EventKind::Join => {
                self.directory
                    .join_if(room, origin, || self.registry.is_open(origin))?;
                event.with_message(self.config.join_notice.as_str())
            }
            _ if !self.registry.is_open(origin) => return None,
            EventKind::Leave => {
                self.directory.leave(room, origin);
                event.with_message(self.config.leave_notice.as_str())
            }
            EventKind::Message | EventKind::Other(_) => event,
        };

        let recipients = self.directory.members_of(room);
        trace!(
            connection = %origin,
            room = room,
            kind = %event.kind,
            recipients = recipients.len(),
            "Routed event"
        );

        Some(Delivery { event, recipients })
    }

    /// Send a delivery to every recipient.
    ///
    /// A failed send is logged and counted; it never stops the others.
    pub async fn deliver(&self, delivery: Delivery) -> DeliveryReport {
        let Delivery { event, recipients } = delivery;
        let mut report = DeliveryReport::empty(&event);
        report.recipients = recipients.len();

        let event = &event;
        let sends = recipients.iter().map(|to| async move {
            let result = if self.registry.contains(to) {
                self.outbound.send(to, event).await
            } else {
                Err(TransportError::UnknownConnection(to.clone()))
            };
            (to, result)
        });

        for (to, result) in join_all(sends).await {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        connection = %to,
                        room = event.room_id,
                        error = %e,
                        "Delivery failed"
                    );
                }
            }
        }

        report
    }

    /// Handle one inbound event from a connection.
    ///
    /// Events from connections that are not registered, or are being torn
    /// down, are dropped.
    pub async fn handle(&self, origin: &ConnectionId, event: Event) -> DeliveryReport {
        let dropped = DeliveryReport::empty(&event);
        let sender = event.sender.clone();

        let Some(delivery) = self.route(origin, event) else {
            debug!(connection = %origin, kind = %dropped.kind, "Event from closed connection");
            return dropped;
        };

        if !sender.is_empty() {
            self.registry.set_label(origin, &sender);
        }
        self.deliver(delivery).await
    }

    /// Tear down a connection.
    ///
    /// The connection stops accepting joins, leaves every room and is then
    /// unregistered, so no later snapshot can include it. Returns the rooms
    /// it was in.
    pub async fn disconnect(&self, id: &ConnectionId) -> Vec<RoomId> {
        self.registry.begin_close(id);
        let label = self.registry.label(id).unwrap_or_default();
        let rooms = self.directory.leave_all(id);
        self.registry.remove(id);

        if self.config.announce_disconnect {
            for room in &rooms {
                let delivery = Delivery {
                    event: Event::leave(*room, label.as_str())
                        .with_message(self.config.leave_notice.as_str()),
                    recipients: self.directory.members_of(*room),
                };
                self.deliver(delivery).await;
            }
        }

        if let Err(e) = self.outbound.close(id, &self.config.close_reason).await {
            trace!(connection = %id, error = %e, "Close notice not sent");
        }

        debug!(connection = %id, rooms = rooms.len(), "Connection torn down");
        rooms
    }
}

/// Router statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RouterStats {
    /// Number of registered connections.
    pub connection_count: usize,
    /// Room directory statistics.
    pub rooms: DirectoryStats,
}
