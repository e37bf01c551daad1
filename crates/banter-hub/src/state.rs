//! Indexed hub state: the connection table and the room table.
//!
//! Both tables are plain data guarded by the hub's read/write locks; they
//! contain no locking of their own. The connection table maintains the
//! bidirectional mapping connection id -> connection and user id ->
//! connection ids; the room table maintains membership and the per-room
//! message counter.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::{
    conn::Conn,
    entry::{ConnId, MessageId, RoomId, UserId},
};

struct ConnRec {
    conn: Arc<dyn Conn>,
    user_id: UserId,
}

/// Connection indices: connections by id, connection ids by user.
///
/// A user is online iff its connection id list is non-empty; empty lists
/// are removed eagerly so the map doubles as the online-user index.
#[derive(Default)]
pub(crate) struct ConnTable {
    conns: HashMap<ConnId, ConnRec>,
    user_conns: HashMap<UserId, Vec<ConnId>>,
}

impl ConnTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Returns `false` if the id is already taken.
    pub(crate) fn insert(&mut self, conn_id: ConnId, user_id: UserId, conn: Arc<dyn Conn>) -> bool {
        if self.conns.contains_key(&conn_id) {
            return false;
        }

        self.conns.insert(conn_id, ConnRec { conn, user_id });
        self.user_conns.entry(user_id).or_default().push(conn_id);
        true
    }

    /// Remove a connection from both indices and return its capability.
    ///
    /// Removal from the user's connection list is swap-with-last; the
    /// order of that list is not observable.
    pub(crate) fn remove(&mut self, conn_id: ConnId) -> Option<Arc<dyn Conn>> {
        let rec = self.conns.remove(&conn_id)?;

        if let Some(ids) = self.user_conns.get_mut(&rec.user_id) {
            if let Some(at) = ids.iter().position(|&id| id == conn_id) {
                ids.swap_remove(at);
            }
            if ids.is_empty() {
                self.user_conns.remove(&rec.user_id);
            }
        }

        Some(rec.conn)
    }

    pub(crate) fn get(&self, conn_id: ConnId) -> Option<&Arc<dyn Conn>> {
        self.conns.get(&conn_id).map(|rec| &rec.conn)
    }

    pub(crate) fn contains(&self, conn_id: ConnId) -> bool {
        self.conns.contains_key(&conn_id)
    }

    /// User owning a connection. `None` if the connection is unknown.
    pub(crate) fn user_of(&self, conn_id: ConnId) -> Option<UserId> {
        self.conns.get(&conn_id).map(|rec| rec.user_id)
    }

    /// Connection ids of one user; empty if the user is offline.
    pub(crate) fn user_conn_ids(&self, user_id: UserId) -> &[ConnId] {
        self.user_conns.get(&user_id).map_or(&[], Vec::as_slice)
    }

    /// All registered connection ids, in no particular order.
    pub(crate) fn conn_ids(&self) -> impl Iterator<Item = ConnId> + '_ {
        self.conns.keys().copied()
    }

    /// Users with at least one live connection.
    pub(crate) fn online_user_ids(&self) -> Vec<UserId> {
        self.user_conns.keys().copied().collect()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.conns.len()
    }
}

/// One room: its member set and the monotonic message counter.
pub(crate) struct Room {
    members: HashSet<UserId>,
    /// Highest message id accepted for this room. Only ever increases.
    /// Atomic so the counter can be bumped under the room table's read
    /// lock; concurrent posters are already serialized by the buffer lock.
    last_message_id: AtomicU64,
}

impl Room {
    fn new(last_message_id: MessageId, members: &[UserId]) -> Self {
        Self {
            members: members.iter().copied().collect(),
            last_message_id: AtomicU64::new(last_message_id),
        }
    }

    /// Claim the next message id for this room.
    pub(crate) fn next_message_id(&self) -> MessageId {
        self.last_message_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn last_message_id(&self) -> MessageId {
        self.last_message_id.load(Ordering::SeqCst)
    }

    pub(crate) fn members(&self) -> &HashSet<UserId> {
        &self.members
    }

    pub(crate) fn is_member(&self, user_id: UserId) -> bool {
        self.members.contains(&user_id)
    }
}

/// Rooms by id.
#[derive(Default)]
pub(crate) struct RoomTable {
    rooms: HashMap<RoomId, Room>,
}

impl RoomTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Create a room with the given initial counter (supports resuming
    /// from a stored high-water mark) and member set. No-op if the room
    /// already exists; returns whether it was created.
    pub(crate) fn create(
        &mut self,
        room_id: RoomId,
        last_message_id: MessageId,
        members: &[UserId],
    ) -> bool {
        if self.rooms.contains_key(&room_id) {
            return false;
        }

        self.rooms.insert(room_id, Room::new(last_message_id, members));
        true
    }

    /// Remove the room entry. Persisted messages are untouched.
    pub(crate) fn delete(&mut self, room_id: RoomId) -> bool {
        self.rooms.remove(&room_id).is_some()
    }

    pub(crate) fn get(&self, room_id: RoomId) -> Option<&Room> {
        self.rooms.get(&room_id)
    }

    /// Add a user to a room's member set. Idempotent on re-enter.
    /// Returns `false` if the room does not exist.
    pub(crate) fn enter(&mut self, user_id: UserId, room_id: RoomId) -> bool {
        match self.rooms.get_mut(&room_id) {
            Some(room) => {
                room.members.insert(user_id);
                true
            },
            None => false,
        }
    }

    /// Remove a user from a room's member set. No-op if the room or the
    /// membership is absent.
    pub(crate) fn leave(&mut self, user_id: UserId, room_id: RoomId) {
        if let Some(room) = self.rooms.get_mut(&room_id) {
            room.members.remove(&user_id);
        }
    }

    /// Rooms containing a user.
    pub(crate) fn rooms_with(&self, user_id: UserId) -> Vec<RoomId> {
        self.rooms
            .iter()
            .filter(|(_, room)| room.is_member(user_id))
            .map(|(&id, _)| id)
            .collect()
    }
}
