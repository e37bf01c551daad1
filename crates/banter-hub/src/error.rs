//! Hub error types.

use thiserror::Error;

use crate::{
    entry::{ConnId, MessageId, RoomId, UserId},
    store::StoreError,
};

/// Errors surfaced by the hub's public operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HubError {
    /// The hub has been shut down; the caller should stop using it.
    #[error("hub is stopped")]
    Stopped,

    /// `connect` was called with an id that is already registered.
    #[error("connection {0} already registered")]
    DuplicateConnection(ConnId),

    /// A non-zero connection id that is not registered.
    #[error("connection {0} not found")]
    UnknownConnection(ConnId),

    /// The addressed room is not present.
    #[error("room {0} not found")]
    UnknownRoom(RoomId),

    /// The user is not a member of the addressed room.
    #[error("user {user_id} is not in room {room_id}")]
    NotMember {
        /// The querying user.
        user_id: UserId,
        /// The room the user is not a member of.
        room_id: RoomId,
    },

    /// Neither the store nor the buffer contains the addressed message.
    #[error("message {message_id} not found in room {room_id}")]
    UnknownMessage {
        /// The room searched.
        room_id: RoomId,
        /// The missing message id.
        message_id: MessageId,
    },

    /// Forwarded verbatim from the message store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
