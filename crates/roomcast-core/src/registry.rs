//! Live connection tracking.

use dashmap::DashMap;
use roomcast_transport::ConnectionId;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug)]
struct ConnectionEntry {
    connected_at: Instant,
    label: Option<String>,
    closing: bool,
}

/// The set of connections the transport reported as open.
///
/// All operations are idempotent. The registry knows nothing about rooms.
///
/// A connection being torn down stays registered but stops being *open*
/// until it is removed.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, ConnectionEntry>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection.
    ///
    /// Returns `false` if it was already registered, leaving it untouched.
    pub fn add(&self, id: ConnectionId) -> bool {
        let mut added = false;
        self.connections.entry(id.clone()).or_insert_with(|| {
            added = true;
            ConnectionEntry {
                connected_at: Instant::now(),
                label: None,
                closing: false,
            }
        });
        if added {
            debug!(connection = %id, "Connection registered");
        }
        added
    }

    /// Unregister a connection.
    ///
    /// Returns `true` if it was registered.
    pub fn remove(&self, id: &ConnectionId) -> bool {
        let removed = self.connections.remove(id).is_some();
        if removed {
            debug!(connection = %id, "Connection unregistered");
        }
        removed
    }

    /// Check whether a connection is registered.
    #[must_use]
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    /// Check whether a connection is registered and not being torn down.
    #[must_use]
    pub fn is_open(&self, id: &ConnectionId) -> bool {
        self.connections.get(id).is_some_and(|e| !e.closing)
    }

    /// Mark a connection as being torn down.
    ///
    /// Returns `false` if it is not registered.
    pub fn begin_close(&self, id: &ConnectionId) -> bool {
        match self.connections.get_mut(id) {
            Some(mut entry) => {
                entry.closing = true;
                true
            }
            None => false,
        }
    }

    /// Record the sender label a connection last used.
    pub fn set_label(&self, id: &ConnectionId, label: &str) {
        if let Some(mut entry) = self.connections.get_mut(id) {
            if entry.label.as_deref() != Some(label) {
                entry.label = Some(label.to_string());
            }
        }
    }

    /// The sender label a connection last used, if any.
    #[must_use]
    pub fn label(&self, id: &ConnectionId) -> Option<String> {
        self.connections.get(id).and_then(|e| e.label.clone())
    }

    /// How long a connection has been registered.
    #[must_use]
    pub fn age(&self, id: &ConnectionId) -> Option<Duration> {
        self.connections.get(id).map(|e| e.connected_at.elapsed())
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let id = ConnectionId::new("conn-1");

        assert!(registry.add(id.clone()));
        registry.set_label(&id, "alice");
        assert!(!registry.add(id.clone()));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.label(&id).as_deref(), Some("alice"));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let id = ConnectionId::new("conn-1");

        // Never added
        assert!(!registry.remove(&id));

        registry.add(id.clone());
        assert!(registry.contains(&id));
        assert!(registry.remove(&id));
        assert!(!registry.remove(&id));
        assert!(!registry.contains(&id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_label_and_age_of_unknown_connection() {
        let registry = ConnectionRegistry::new();
        let id = ConnectionId::new("ghost");

        registry.set_label(&id, "nobody");
        assert!(registry.label(&id).is_none());
        assert!(registry.age(&id).is_none());
        assert!(!registry.contains(&id));
    }

    #[test]
    fn test_begin_close() {
        let registry = ConnectionRegistry::new();
        let id = ConnectionId::new("conn-1");

        assert!(!registry.begin_close(&id));

        registry.add(id.clone());
        assert!(registry.is_open(&id));
        assert!(registry.begin_close(&id));
        assert!(!registry.is_open(&id));
        assert!(registry.contains(&id));

        // Re-adding a closing connection does not reopen it
        assert!(!registry.add(id.clone()));
        assert!(!registry.is_open(&id));

        registry.remove(&id);
        assert!(!registry.is_open(&id));
    }

    #[test]
    fn test_age_grows() {
        let registry = ConnectionRegistry::new();
        let id = ConnectionId::new("conn-1");
        registry.add(id.clone());

        let first = registry.age(&id).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert!(registry.age(&id).unwrap() > first);
    }
}
