//! User and room registries.
//!
//! The protocol layer only needs lookups; the in-RAM directories here are
//! the reference implementations the front door wires in. Both share
//! state across clones through `Arc<RwLock<_>>`.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use banter_hub::{RoomId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A registered user as exposed on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    /// User id.
    pub id: UserId,
    /// Display name, unique per directory.
    pub name: String,
}

/// A registered room as exposed on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomEntry {
    /// Room id.
    pub id: RoomId,
    /// Room name, unique per directory.
    pub name: String,
}

/// Registry errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A room with this name already exists.
    #[error("room \"{0}\" already exists")]
    DuplicateRoomName(String),
}

/// Read side of the user directory.
pub trait UserRegistry: Send + Sync + 'static {
    /// Look a user up by id.
    fn user(&self, id: UserId) -> Option<UserEntry>;
}

/// Room directory: enumeration, creation, lookup.
pub trait RoomRegistry: Send + Sync + 'static {
    /// Every registered room, in no particular order.
    fn list_rooms(&self) -> Vec<RoomEntry>;

    /// Register a room under a unique name and return its new id.
    fn create_room(&self, name: &str) -> Result<RoomId, RegistryError>;

    /// Look a room up by id.
    fn room(&self, id: RoomId) -> Option<RoomEntry>;
}

#[derive(Default)]
struct UserDirectoryInner {
    names: HashMap<UserId, String>,
    ids: HashMap<String, UserId>,
    last_id: UserId,
}

/// In-RAM user directory. Names are registered on first use and keep
/// their id afterwards; ids start at 1 (zero stays the system sentinel).
#[derive(Clone, Default)]
pub struct UserDirectory {
    inner: Arc<RwLock<UserDirectoryInner>>,
}

#[allow(clippy::expect_used)]
impl UserDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of a registered name, if any.
    pub fn user_id_by_name(&self, name: &str) -> Option<UserId> {
        self.inner.read().expect("lock poisoned").ids.get(name).copied()
    }

    /// Register a name, or return the existing id when it is taken.
    pub fn add_user(&self, name: &str) -> UserId {
        let mut inner = self.inner.write().expect("lock poisoned");

        if let Some(&id) = inner.ids.get(name) {
            return id;
        }

        inner.last_id += 1;
        let id = inner.last_id;
        inner.names.insert(id, name.to_string());
        inner.ids.insert(name.to_string(), id);
        id
    }
}

#[allow(clippy::expect_used)]
impl UserRegistry for UserDirectory {
    fn user(&self, id: UserId) -> Option<UserEntry> {
        let inner = self.inner.read().expect("lock poisoned");
        inner.names.get(&id).map(|name| UserEntry { id, name: name.clone() })
    }
}

#[derive(Default)]
struct RoomDirectoryInner {
    rooms: HashMap<RoomId, String>,
    last_id: RoomId,
}

/// In-RAM room directory with auto-assigned ids and unique names.
#[derive(Clone, Default)]
pub struct RoomDirectory {
    inner: Arc<RwLock<RoomDirectoryInner>>,
}

impl RoomDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }
}

#[allow(clippy::expect_used)]
impl RoomRegistry for RoomDirectory {
    fn list_rooms(&self) -> Vec<RoomEntry> {
        let inner = self.inner.read().expect("lock poisoned");
        inner
            .rooms
            .iter()
            .map(|(&id, name)| RoomEntry { id, name: name.clone() })
            .collect()
    }

    fn create_room(&self, name: &str) -> Result<RoomId, RegistryError> {
        let mut inner = self.inner.write().expect("lock poisoned");

        if inner.rooms.values().any(|existing| existing == name) {
            return Err(RegistryError::DuplicateRoomName(name.to_string()));
        }

        inner.last_id += 1;
        let id = inner.last_id;
        inner.rooms.insert(id, name.to_string());
        Ok(id)
    }

    fn room(&self, id: RoomId) -> Option<RoomEntry> {
        let inner = self.inner.read().expect("lock poisoned");
        inner.rooms.get(&id).map(|name| RoomEntry { id, name: name.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_names_register_once() {
        let users = UserDirectory::new();

        let alice = users.add_user("alice");
        let bob = users.add_user("bob");
        assert_ne!(alice, bob);
        assert!(alice >= 1, "ids leave zero for the system sentinel");

        // Same name, same id.
        assert_eq!(users.add_user("alice"), alice);
        assert_eq!(users.user_id_by_name("alice"), Some(alice));
        assert_eq!(users.user_id_by_name("nobody"), None);

        let entry = users.user(alice).expect("alice exists");
        assert_eq!(entry.name, "alice");
        assert!(users.user(999).is_none());
    }

    #[test]
    fn room_names_are_unique() {
        let rooms = RoomDirectory::new();

        let lobby = rooms.create_room("lobby").expect("create failed");
        assert_eq!(
            rooms.create_room("lobby"),
            Err(RegistryError::DuplicateRoomName("lobby".to_string()))
        );

        let den = rooms.create_room("den").expect("create failed");
        assert_ne!(lobby, den);

        let mut listed = rooms.list_rooms();
        listed.sort_by_key(|room| room.id);
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "lobby");

        assert_eq!(rooms.room(lobby).expect("lobby exists").name, "lobby");
        assert!(rooms.room(999).is_none());
    }
}
