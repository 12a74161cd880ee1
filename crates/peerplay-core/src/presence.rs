//! Presence tracking for PeerPlay.
//!
//! The registry is the single source of truth for who is in which room.
//! Rooms are created on first join and keep their members in join order.

use peerplay_protocol::{Member, RoomId};
use peerplay_transport::ConnectionId;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Display name used when the handshake carries none.
pub const DEFAULT_USERNAME: &str = "Anonymous";

/// Members of a room in join order.
pub type PresenceSnapshot = Vec<Member>;

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Delete a room as soon as its last member leaves.
    pub prune_empty_rooms: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            prune_empty_rooms: true,
        }
    }
}

#[derive(Debug)]
struct Room {
    /// Registration order among all rooms.
    seq: u64,
    members: Vec<Member>,
}

impl Room {
    fn position(&self, connection_id: &str) -> Option<usize> {
        self.members.iter().position(|m| m.id == connection_id)
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    rooms: HashMap<RoomId, Room>,
    /// Connection -> rooms it is a member of.
    memberships: HashMap<ConnectionId, Vec<RoomId>>,
    next_seq: u64,
}

impl RegistryState {
    fn remove_member(
        &mut self,
        connection_id: &ConnectionId,
        room_id: &str,
        prune: bool,
    ) -> Option<PresenceSnapshot> {
        let room = self.rooms.get_mut(room_id)?;
        let index = room.position(connection_id.as_str())?;
        room.members.remove(index);
        let snapshot = room.members.clone();

        if prune && room.members.is_empty() {
            self.rooms.remove(room_id);
            debug!(room = %room_id, "Deleted empty room");
        }

        if let Some(rooms) = self.memberships.get_mut(connection_id) {
            rooms.retain(|r| r != room_id);
            if rooms.is_empty() {
                self.memberships.remove(connection_id);
            }
        }

        Some(snapshot)
    }

    /// The earliest-registered room that still lists the connection.
    fn first_room_of(&self, connection_id: &ConnectionId) -> Option<RoomId> {
        self.memberships
            .get(connection_id)?
            .iter()
            .filter_map(|id| self.rooms.get(id).map(|room| (room.seq, id)))
            .min_by_key(|(seq, _)| *seq)
            .map(|(_, id)| id.clone())
    }
}

/// Room membership registry.
///
/// All operations are synchronous and serialized through one lock. The
/// `*_then` variants run a callback with the fresh snapshot before the lock
/// is released, so broadcasts built from it go out in mutation order.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    state: Mutex<RegistryState>,
    config: RegistryConfig,
}

impl PresenceRegistry {
    /// Create a new registry with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new registry with custom configuration.
    #[must_use]
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            state: Mutex::default(),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // Every mutation leaves the maps consistent, so a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a connection to a room and return the room's snapshot.
    ///
    /// Re-joining the same room overwrites the display name in place.
    pub fn join(
        &self,
        room_id: &str,
        connection_id: &ConnectionId,
        username: &str,
    ) -> PresenceSnapshot {
        self.join_then(room_id, connection_id, username, <[Member]>::to_vec)
    }

    /// Like [`join`](Self::join), running `f` on the snapshot under the lock.
    pub fn join_then<R>(
        &self,
        room_id: &str,
        connection_id: &ConnectionId,
        username: &str,
        f: impl FnOnce(&[Member]) -> R,
    ) -> R {
        let mut guard = self.lock();
        let state = &mut *guard;

        let seq = state.next_seq;
        let room = state.rooms.entry(room_id.to_string()).or_insert_with(|| {
            debug!(room = %room_id, "Creating new room");
            Room {
                seq,
                members: Vec::new(),
            }
        });
        if room.seq == seq {
            state.next_seq += 1;
        }

        match room.position(connection_id.as_str()) {
            Some(index) => room.members[index].username = username.to_string(),
            None => {
                room.members
                    .push(Member::new(connection_id.as_str(), username));
                state
                    .memberships
                    .entry(connection_id.clone())
                    .or_default()
                    .push(room_id.to_string());
            }
        }

        trace!(
            room = %room_id,
            connection = %connection_id,
            members = room.members.len(),
            "Presence: member joined"
        );

        f(&room.members)
    }

    /// Remove a connection from the first room that lists it.
    ///
    /// Rooms are searched in registration order. Only that room is touched.
    /// Returns `None` if the connection is not in any room.
    pub fn leave(&self, connection_id: &ConnectionId) -> Option<(RoomId, PresenceSnapshot)> {
        self.leave_then(connection_id, |room_id, members| {
            (room_id.to_string(), members.to_vec())
        })
    }

    /// Like [`leave`](Self::leave), running `f` on the room and its snapshot
    /// under the lock.
    pub fn leave_then<R>(
        &self,
        connection_id: &ConnectionId,
        f: impl FnOnce(&str, &[Member]) -> R,
    ) -> Option<R> {
        let mut state = self.lock();
        let room_id = state.first_room_of(connection_id)?;
        let snapshot = state.remove_member(connection_id, &room_id, self.config.prune_empty_rooms)?;
        debug!(room = %room_id, connection = %connection_id, "Presence: member left");
        Some(f(&room_id, &snapshot))
    }

    /// Remove a connection from one specific room.
    ///
    /// Returns `None` if it was not a member.
    pub fn leave_room_then<R>(
        &self,
        connection_id: &ConnectionId,
        room_id: &str,
        f: impl FnOnce(&[Member]) -> R,
    ) -> Option<R> {
        let mut state = self.lock();
        let snapshot = state.remove_member(connection_id, room_id, self.config.prune_empty_rooms)?;
        debug!(room = %room_id, connection = %connection_id, "Presence: member left room");
        Some(f(&snapshot))
    }

    /// Current members of a room in join order. Empty for unknown rooms.
    #[must_use]
    pub fn snapshot(&self, room_id: &str) -> PresenceSnapshot {
        self.lock()
            .rooms
            .get(room_id)
            .map(|room| room.members.clone())
            .unwrap_or_default()
    }

    /// Rooms a connection is a member of, in the order it joined them.
    #[must_use]
    pub fn rooms_of(&self, connection_id: &ConnectionId) -> Vec<RoomId> {
        self.lock()
            .memberships
            .get(connection_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Check if a connection is a member of a room.
    #[must_use]
    pub fn is_member(&self, room_id: &str, connection_id: &ConnectionId) -> bool {
        self.lock()
            .rooms
            .get(room_id)
            .is_some_and(|room| room.position(connection_id.as_str()).is_some())
    }

    /// Check if a room exists.
    #[must_use]
    pub fn room_exists(&self, room_id: &str) -> bool {
        self.lock().rooms.contains_key(room_id)
    }

    /// Number of rooms, empty ones included when pruning is off.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.lock().rooms.len()
    }

    /// Number of connections with at least one membership.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.lock().memberships.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(id: &str) -> ConnectionId {
        ConnectionId::new(id)
    }

    fn ids(snapshot: &[Member]) -> Vec<&str> {
        snapshot.iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn test_snapshot_in_join_order() {
        let registry = PresenceRegistry::new();
        for id in ["c3", "c1", "c2"] {
            registry.join("r1", &conn(id), id);
        }
        assert_eq!(ids(&registry.snapshot("r1")), vec!["c3", "c1", "c2"]);
    }

    #[test]
    fn test_rejoin_is_idempotent() {
        let registry = PresenceRegistry::new();
        registry.join("r1", &conn("a"), "alice");
        registry.join("r1", &conn("b"), "bob");
        let snapshot = registry.join("r1", &conn("a"), "alice2");

        assert_eq!(
            snapshot,
            vec![Member::new("a", "alice2"), Member::new("b", "bob")]
        );
        assert_eq!(registry.rooms_of(&conn("a")), vec!["r1".to_string()]);
    }

    #[test]
    fn test_unknown_room_snapshot_is_empty() {
        let registry = PresenceRegistry::new();
        assert!(registry.snapshot("nowhere").is_empty());
        assert!(!registry.room_exists("nowhere"));
    }

    #[test]
    fn test_empty_room_id_is_a_valid_key() {
        let registry = PresenceRegistry::new();
        registry.join("", &conn("a"), "alice");
        assert_eq!(registry.snapshot(""), vec![Member::new("a", "alice")]);
    }

    #[test]
    fn test_leave_returns_room_and_remaining_members() {
        let registry = PresenceRegistry::new();
        registry.join("r1", &conn("a"), "alice");
        registry.join("r1", &conn("b"), "bob");

        let (room, snapshot) = registry.leave(&conn("b")).unwrap();
        assert_eq!(room, "r1");
        assert_eq!(snapshot, vec![Member::new("a", "alice")]);

        assert!(registry.leave(&conn("b")).is_none());
    }

    #[test]
    fn test_leave_untracked_connection() {
        let registry = PresenceRegistry::new();
        registry.join("r1", &conn("a"), "alice");
        assert!(registry.leave(&conn("ghost")).is_none());
        assert_eq!(registry.snapshot("r1").len(), 1);
    }

    #[test]
    fn test_leave_touches_first_registered_room_only() {
        let registry = PresenceRegistry::new();
        registry.join("older", &conn("x"), "xavier");
        registry.join("newer", &conn("a"), "alice");
        registry.join("older", &conn("a"), "alice");

        // "older" was registered first, even though "a" joined it second
        let (room, _) = registry.leave(&conn("a")).unwrap();
        assert_eq!(room, "older");
        assert!(registry.is_member("newer", &conn("a")));

        let (room, snapshot) = registry.leave(&conn("a")).unwrap();
        assert_eq!(room, "newer");
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_empty_rooms_are_pruned() {
        let registry = PresenceRegistry::new();
        registry.join("r1", &conn("a"), "alice");
        registry.leave(&conn("a"));
        assert!(!registry.room_exists("r1"));
        assert_eq!(registry.room_count(), 0);
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn test_empty_rooms_kept_without_pruning() {
        let registry = PresenceRegistry::with_config(RegistryConfig {
            prune_empty_rooms: false,
        });
        registry.join("r1", &conn("a"), "alice");
        registry.leave(&conn("a"));
        assert!(registry.room_exists("r1"));
        assert!(registry.snapshot("r1").is_empty());
    }

    #[test]
    fn test_recreated_room_registers_last() {
        let registry = PresenceRegistry::new();
        registry.join("r1", &conn("a"), "alice");
        registry.join("r2", &conn("b"), "bob");
        registry.leave(&conn("a"));

        // r1 is gone; recreating it puts it after r2
        registry.join("r1", &conn("b"), "bob");
        let (room, _) = registry.leave(&conn("b")).unwrap();
        assert_eq!(room, "r2");
    }

    #[test]
    fn test_leave_room_then() {
        let registry = PresenceRegistry::new();
        registry.join("r1", &conn("a"), "alice");
        registry.join("r2", &conn("a"), "alice");
        registry.join("r2", &conn("b"), "bob");

        let left = registry.leave_room_then(&conn("a"), "r2", <[Member]>::len);
        assert_eq!(left, Some(1));
        assert_eq!(registry.rooms_of(&conn("a")), vec!["r1".to_string()]);
        assert!(registry
            .leave_room_then(&conn("a"), "r2", |_| ())
            .is_none());
    }

    #[test]
    fn test_concurrent_joins_keep_every_member() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(PresenceRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for i in 0..50 {
                        let id = conn(&format!("c{t}-{i}"));
                        registry.join("shared", &id, "user");
                        if i % 2 == 0 {
                            registry.leave(&id);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.snapshot("shared").len(), 8 * 25);
    }
}
