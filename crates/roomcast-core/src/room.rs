//! Room membership.
//!
//! Rooms come into existence on first join. Membership is many-to-many: a
//! connection may sit in any number of rooms, and joining one room does not
//! leave another.
//!
//! Two maps are kept in step: room -> members and connection -> rooms. The
//! reverse index bounds disconnect cleanup by the connection's own
//! memberships instead of the number of rooms. Whenever both are locked, the
//! connection entry is taken first.

use dashmap::DashMap;
use roomcast_protocol::RoomId;
use roomcast_transport::ConnectionId;
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

/// Room membership directory.
#[derive(Debug)]
pub struct RoomDirectory {
    /// Members of each room.
    rooms: DashMap<RoomId, HashSet<ConnectionId>>,
    /// Rooms of each connection.
    memberships: DashMap<ConnectionId, HashSet<RoomId>>,
    /// Drop a room entry once its last member is gone.
    auto_delete_empty: bool,
}

impl RoomDirectory {
    /// Create a directory that deletes rooms when they become empty.
    #[must_use]
    pub fn new() -> Self {
        Self::with_auto_delete(true)
    }

    /// Create a directory, choosing whether empty rooms are deleted.
    #[must_use]
    pub fn with_auto_delete(auto_delete_empty: bool) -> Self {
        Self {
            rooms: DashMap::new(),
            memberships: DashMap::new(),
            auto_delete_empty,
        }
    }

    /// Add a connection to a room, creating the room if needed.
    ///
    /// Returns `true` if the connection was not already a member.
    pub fn join(&self, room: RoomId, id: &ConnectionId) -> bool {
        self.join_if(room, id, || true).unwrap_or(false)
    }

    /// Add a connection to a room if `admit` allows it.
    ///
    /// `admit` runs while the connection's membership entry is locked, so a
    /// concurrent [`leave_all`](Self::leave_all) for the same connection
    /// either sees this join or runs after `admit` has refused it. Returns
    /// `None` if refused, otherwise whether the connection was newly added.
    pub fn join_if(
        &self,
        room: RoomId,
        id: &ConnectionId,
        admit: impl FnOnce() -> bool,
    ) -> Option<bool> {
        let entry = self.memberships.entry(id.clone());
        if !admit() {
            debug!(room = room, connection = %id, "Join refused");
            return None;
        }
        let mut joined = entry.or_default();

        let mut members = self.rooms.entry(room).or_insert_with(|| {
            debug!(room = room, "Creating room");
            HashSet::new()
        });

        let added = members.insert(id.clone());
        joined.insert(room);

        if added {
            debug!(room = room, connection = %id, members = members.len(), "Joined room");
        }
        Some(added)
    }

    /// Remove a connection from a room.
    ///
    /// Unknown rooms and non-members are ignored. Returns `true` if the
    /// connection was a member.
    pub fn leave(&self, room: RoomId, id: &ConnectionId) -> bool {
        let Some(mut joined) = self.memberships.get_mut(id) else {
            return false;
        };
        if !joined.remove(&room) {
            return false;
        }
        let no_rooms_left = joined.is_empty();

        self.detach(room, id);
        debug!(room = room, connection = %id, "Left room");

        drop(joined);
        if no_rooms_left {
            self.memberships.remove_if(id, |_, rooms| rooms.is_empty());
        }
        true
    }

    /// Remove a connection from every room it belongs to.
    ///
    /// Returns the rooms it was removed from.
    pub fn leave_all(&self, id: &ConnectionId) -> Vec<RoomId> {
        let Some((_, rooms)) = self.memberships.remove(id) else {
            return Vec::new();
        };

        for room in &rooms {
            self.detach(*room, id);
        }

        debug!(connection = %id, rooms = rooms.len(), "Left all rooms");
        rooms.into_iter().collect()
    }

    /// Snapshot of a room's members.
    ///
    /// Empty if the room has no entry.
    #[must_use]
    pub fn members_of(&self, room: RoomId) -> Vec<ConnectionId> {
        self.rooms
            .get(&room)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of the rooms a connection belongs to.
    #[must_use]
    pub fn rooms_of(&self, id: &ConnectionId) -> Vec<RoomId> {
        self.memberships
            .get(id)
            .map(|rooms| rooms.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Check whether a room has an entry.
    #[must_use]
    pub fn room_exists(&self, room: RoomId) -> bool {
        self.rooms.contains_key(&room)
    }

    /// Number of members in a room.
    #[must_use]
    pub fn member_count(&self, room: RoomId) -> usize {
        self.rooms.get(&room).map(|m| m.len()).unwrap_or(0)
    }

    /// Number of room entries.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Directory statistics.
    #[must_use]
    pub fn stats(&self) -> DirectoryStats {
        DirectoryStats {
            room_count: self.rooms.len(),
            member_count: self.memberships.len(),
            total_memberships: self.memberships.iter().map(|r| r.len()).sum(),
        }
    }

    fn detach(&self, room: RoomId, id: &ConnectionId) {
        if let Some(mut members) = self.rooms.get_mut(&room) {
            members.remove(id);
        }

        if self.auto_delete_empty
            && self
                .rooms
                .remove_if(&room, |_, members| members.is_empty())
                .is_some()
        {
            debug!(room = room, "Deleted empty room");
        }
    }
}

impl Default for RoomDirectory {
    fn default() -> Self {
        Self::new()
    }
}

/// Room directory statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DirectoryStats {
    /// Number of room entries.
    pub room_count: usize,
    /// Number of connections in at least one room.
    pub member_count: usize,
    /// Total number of (room, connection) pairs.
    pub total_memberships: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(mut ids: Vec<ConnectionId>) -> Vec<ConnectionId> {
        ids.sort();
        ids
    }

    #[test]
    fn test_join_is_idempotent() {
        let directory = RoomDirectory::new();
        let id = ConnectionId::new("conn-1");

        assert!(directory.join(7, &id));
        assert!(!directory.join(7, &id));
        assert!(!directory.join(7, &id));

        assert_eq!(directory.members_of(7), vec![id.clone()]);
        assert_eq!(directory.rooms_of(&id), vec![7]);
    }

    #[test]
    fn test_leave_and_repeat_leave() {
        let directory = RoomDirectory::new();
        let a = ConnectionId::new("a");
        let b = ConnectionId::new("b");

        directory.join(1, &a);
        directory.join(1, &b);

        assert!(directory.leave(1, &a));
        assert_eq!(directory.members_of(1), vec![b.clone()]);

        // Second leave is a no-op
        assert!(!directory.leave(1, &a));
        assert_eq!(directory.members_of(1), vec![b]);
    }

    #[test]
    fn test_leave_unknown_room_or_non_member() {
        let directory = RoomDirectory::new();
        let a = ConnectionId::new("a");

        assert!(!directory.leave(99, &a));

        directory.join(1, &a);
        assert!(!directory.leave(2, &a));
        assert!(!directory.leave(1, &ConnectionId::new("b")));
        assert_eq!(directory.member_count(1), 1);
    }

    #[test]
    fn test_members_of_unknown_room() {
        let directory = RoomDirectory::new();
        assert!(directory.members_of(12345).is_empty());
        assert!(!directory.room_exists(12345));
    }

    #[test]
    fn test_multi_room_membership() {
        let directory = RoomDirectory::new();
        let a = ConnectionId::new("a");

        directory.join(1, &a);
        directory.join(2, &a);

        // Joining room 2 did not leave room 1
        assert_eq!(directory.members_of(1), vec![a.clone()]);
        assert_eq!(directory.members_of(2), vec![a.clone()]);

        let mut rooms = directory.rooms_of(&a);
        rooms.sort_unstable();
        assert_eq!(rooms, vec![1, 2]);
    }

    #[test]
    fn test_leave_all_visits_every_room() {
        let directory = RoomDirectory::new();
        let a = ConnectionId::new("a");
        let b = ConnectionId::new("b");

        for room in [1, 2, 3] {
            directory.join(room, &a);
        }
        directory.join(2, &b);

        let mut left = directory.leave_all(&a);
        left.sort_unstable();
        assert_eq!(left, vec![1, 2, 3]);

        for room in [1, 2, 3] {
            assert!(!directory.members_of(room).contains(&a));
        }
        assert_eq!(directory.members_of(2), vec![b]);
        assert!(directory.rooms_of(&a).is_empty());

        // Nothing left to do the second time
        assert!(directory.leave_all(&a).is_empty());
    }

    #[test]
    fn test_empty_rooms_are_deleted() {
        let directory = RoomDirectory::new();
        let a = ConnectionId::new("a");

        directory.join(5, &a);
        assert!(directory.room_exists(5));

        directory.leave(5, &a);
        assert!(!directory.room_exists(5));
        assert_eq!(directory.stats().member_count, 0);
    }

    #[test]
    fn test_empty_rooms_kept_without_auto_delete() {
        let directory = RoomDirectory::with_auto_delete(false);
        let a = ConnectionId::new("a");

        directory.join(5, &a);
        directory.leave_all(&a);

        assert!(directory.room_exists(5));
        assert!(directory.members_of(5).is_empty());
    }

    #[test]
    fn test_stats() {
        let directory = RoomDirectory::new();
        let a = ConnectionId::new("a");
        let b = ConnectionId::new("b");

        directory.join(1, &a);
        directory.join(2, &a);
        directory.join(1, &b);

        assert_eq!(
            directory.stats(),
            DirectoryStats {
                room_count: 2,
                member_count: 2,
                total_memberships: 3,
            }
        );
        assert_eq!(sorted(directory.members_of(1)), vec![a, b]);
    }

    #[test]
    fn test_join_if_refused() {
        let directory = RoomDirectory::new();
        let id = ConnectionId::new("conn-1");

        assert_eq!(directory.join_if(5, &id, || false), None);
        assert!(!directory.room_exists(5));
        assert!(directory.rooms_of(&id).is_empty());
        assert_eq!(directory.stats().member_count, 0);

        assert_eq!(directory.join_if(5, &id, || true), Some(true));
        assert_eq!(directory.join_if(5, &id, || true), Some(false));
        assert_eq!(directory.members_of(5), vec![id]);
    }
}
