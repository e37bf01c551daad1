use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use serde_json::Value;

use super::{MessageStore, StoreError};
use crate::entry::{MessageEntry, MessageId, RoomId};

/// In-memory reference implementation of [`MessageStore`].
///
/// Messages are kept per room in append-only vectors, always sorted by
/// `message_id` (the hub hands them over in id order). All state sits
/// behind `Arc<Mutex<_>>` so clones share the same storage. Uses
/// `lock().expect()`, which panics if the mutex is poisoned - acceptable
/// for the reference/test implementation.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<HashMap<RoomId, Vec<MessageEntry>>>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rooms with at least one persisted message.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn room_count(&self) -> usize {
        self.inner.lock().expect("mutex poisoned").len()
    }

    /// Total number of persisted messages across all rooms.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn message_count(&self) -> usize {
        self.inner.lock().expect("mutex poisoned").values().map(Vec::len).sum()
    }
}

#[allow(clippy::expect_used)]
impl MessageStore for MemoryStore {
    fn save(&self, batch: &[MessageEntry]) -> Result<(), StoreError> {
        let mut rooms = self.inner.lock().expect("mutex poisoned");

        for entry in batch {
            rooms.entry(entry.room_id).or_default().push(entry.clone());
        }

        Ok(())
    }

    fn list(
        &self,
        room_id: RoomId,
        first_id: MessageId,
        count: usize,
    ) -> Result<Vec<MessageEntry>, StoreError> {
        let rooms = self.inner.lock().expect("mutex poisoned");

        let Some(messages) = rooms.get(&room_id) else {
            return Ok(Vec::new());
        };

        let start = messages.partition_point(|m| m.message_id < first_id);
        let end = (start + count).min(messages.len());

        Ok(messages[start..end].to_vec())
    }

    fn update(
        &self,
        room_id: RoomId,
        message_id: MessageId,
        data: Value,
    ) -> Result<Option<MessageEntry>, StoreError> {
        let mut rooms = self.inner.lock().expect("mutex poisoned");

        let Some(messages) = rooms.get_mut(&room_id) else {
            return Ok(None);
        };

        let index = messages.partition_point(|m| m.message_id < message_id);
        match messages.get_mut(index) {
            Some(entry) if entry.message_id == message_id => {
                entry.data = data;
                Ok(Some(entry.clone()))
            },
            _ => Ok(None),
        }
    }
}
