//! Message store contract.
//!
//! Trait-based abstraction for persisting accepted messages. The trait is
//! synchronous (no async) so implementations stay runtime-agnostic; the
//! hub calls it from the flush engine in fixed-size slices and from the
//! history query path.

mod error;
mod memory;

pub use error::StoreError;
pub use memory::MemoryStore;
use serde_json::Value;

use crate::entry::{MessageEntry, MessageId, RoomId};

/// Persistence contract for accepted messages.
///
/// Implementations must be `Send + Sync` (the flush timer, the publishing
/// caller and the query path may all reach the store concurrently) and
/// are expected to share internal state when cloned, like
/// [`MemoryStore`] does.
pub trait MessageStore: Send + Sync + 'static {
    /// Append every entry of `batch` in order, keyed by its `room_id`.
    ///
    /// On failure the hub retains the unsaved entries in its buffer and
    /// retries on the next flush.
    fn save(&self, batch: &[MessageEntry]) -> Result<(), StoreError>;

    /// Up to `count` persisted messages of a room with
    /// `message_id >= first_id`, in ascending id order.
    ///
    /// `first_id == 0` means from the beginning of persisted history.
    /// An unknown room yields an empty list.
    fn list(
        &self,
        room_id: RoomId,
        first_id: MessageId,
        count: usize,
    ) -> Result<Vec<MessageEntry>, StoreError>;

    /// Replace the payload of a persisted message in place.
    ///
    /// Returns the updated entry iff a message with this key exists in
    /// persisted storage; `None` means absent, in which case the hub
    /// searches its unflushed buffer.
    fn update(
        &self,
        room_id: RoomId,
        message_id: MessageId,
        data: Value,
    ) -> Result<Option<MessageEntry>, StoreError>;
}
