//! Unflushed message tail.
//!
//! Accepted messages land here first and are moved to the store by the
//! flush engine in fixed-size slices. The buffer keeps arrival order,
//! which equals id order per room because posters are serialized while
//! they append.

use serde_json::Value;

use crate::{
    entry::{MessageEntry, MessageId, RoomId},
    store::{MessageStore, StoreError},
};

#[derive(Default)]
pub(crate) struct MessageBuffer {
    entries: Vec<MessageEntry>,
}

impl MessageBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, entry: MessageEntry) {
        self.entries.push(entry);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hand buffered entries to the store in slices of `items`.
    ///
    /// Stops at the first `save` error; saved entries are removed, unsaved
    /// entries are retained for the next attempt. `items == 0` disables
    /// flushing entirely.
    pub(crate) fn flush_to<S: MessageStore>(
        &mut self,
        store: &S,
        items: usize,
    ) -> Result<(), StoreError> {
        if items == 0 || self.entries.is_empty() {
            return Ok(());
        }

        let total = self.entries.len();
        let mut saved = 0;
        let mut result = Ok(());

        while saved < total {
            let end = (saved + items).min(total);
            if let Err(e) = store.save(&self.entries[saved..end]) {
                result = Err(e);
                break;
            }
            saved = end;
        }

        self.entries.drain(..saved);
        result
    }

    /// Replace the payload of a buffered message in place. Returns the
    /// updated entry, or `None` if the buffer does not hold that key.
    pub(crate) fn update(
        &mut self,
        room_id: RoomId,
        message_id: MessageId,
        data: Value,
    ) -> Option<MessageEntry> {
        let entry = self
            .entries
            .iter_mut()
            .find(|m| m.room_id == room_id && m.message_id == message_id)?;

        entry.data = data;
        Some(entry.clone())
    }

    /// Append buffered messages of `room_id` with `message_id >= from_id`
    /// to `out`, preserving id order, until `out` holds `count` entries.
    pub(crate) fn collect_range(
        &self,
        room_id: RoomId,
        from_id: MessageId,
        count: usize,
        out: &mut Vec<MessageEntry>,
    ) {
        for entry in &self.entries {
            if out.len() >= count {
                break;
            }
            if entry.room_id == room_id && entry.message_id >= from_id {
                out.push(entry.clone());
            }
        }
    }
}
