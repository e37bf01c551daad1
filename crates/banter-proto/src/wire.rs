//! Wire envelopes and typed request/response bodies.
//!
//! Every inbound frame is a `{request, body}` envelope; every outbound
//! frame is a `{response, body}` envelope. Errors share the uniform
//! `error` verb with a `{message}` body. Field names are camelCase on
//! the wire.

use banter_hub::{MessageEntry, RoomId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{access::PermFlags, registry::UserEntry};

/// Request and response verbs.
pub mod verb {
    /// Post a message / a delivered message.
    pub const MESSAGE: &str = "message";
    /// A delivered in-place message update.
    pub const MESSAGE_UPDATE: &str = "message-update";
    /// Who is this connection's user.
    pub const WHOAMI: &str = "whoami";
    /// Enumerate visible rooms.
    pub const LIST_ROOMS: &str = "list-rooms";
    /// Rooms the user is currently in.
    pub const IN_ROOMS: &str = "in-rooms";
    /// Enter a room.
    pub const ENTER: &str = "enter";
    /// Leave a room.
    pub const LEAVE: &str = "leave";
    /// Create a room.
    pub const NEW_ROOM: &str = "new-room";
    /// Users present in a room.
    pub const LIST_USERS: &str = "list-users";
    /// Read a room's history.
    pub const LIST_MESSAGES: &str = "list-messages";
    /// Look a user up.
    pub const USER_INFO: &str = "user-info";
    /// Look a room up.
    pub const ROOM_INFO: &str = "room-info";
    /// Error response.
    pub const ERROR: &str = "error";
}

/// Message type tag inside a [`MessageRequest`]: plain text.
pub const TEXT_MESSAGE_TYPE: u32 = 1;

/// Inbound request envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request verb.
    pub request: String,
    /// Verb-specific body; absent bodies decode as `null`.
    #[serde(default)]
    pub body: Value,
}

/// Build an outbound `{response, body}` envelope.
///
/// Envelopes travel through the hub as opaque notice payloads, so they
/// are built as JSON values rather than typed structs.
pub fn envelope<T: Serialize>(verb: &str, body: &T) -> Value {
    serde_json::json!({
        "response": verb,
        "body": body,
    })
}

/// Build an `error` envelope.
pub fn error_envelope(message: &str) -> Value {
    envelope(verb::ERROR, &ErrorBody { message: message.to_string() })
}

/// Body of an `error` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable reason.
    pub message: String,
}

/// Body of a `message` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRequest {
    /// Target room.
    pub room_id: RoomId,
    /// Message type tag; see [`TEXT_MESSAGE_TYPE`].
    pub message_type: u32,
    /// Type-specific payload.
    #[serde(default)]
    pub data: Value,
}

/// Payload of a text message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextMessageData {
    /// The message text.
    pub text: String,
}

/// What the hub stores and fans out for a posted message: the type tag
/// plus the typed payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubMessageData {
    /// Message type tag.
    pub message_type: u32,
    /// Type-specific payload.
    pub data: Value,
}

/// Body of a `whoami` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhoamiBody {
    /// The connection's user, if registered.
    pub user: Option<UserEntry>,
    /// The user's global permissions.
    pub perm: PermFlags,
}

/// A room with the requesting user's permissions in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomPermEntry {
    /// Room id.
    pub id: RoomId,
    /// Room name.
    pub name: String,
    /// The requesting user's permissions in this room.
    pub perm: PermFlags,
}

/// Body of `list-rooms` and `in-rooms` responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomListBody {
    /// Visible rooms with permissions.
    pub rooms: Vec<RoomPermEntry>,
}

/// Body of a `new-room` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRoomRequest {
    /// Requested room name.
    pub name: String,
}

/// Body of `enter` requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnterRequest {
    /// Room to enter.
    pub room_id: RoomId,
}

/// Body of an `enter` response, fanned out to the room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnterBody {
    /// The entered room.
    pub room_id: RoomId,
    /// The entering user.
    pub user: Option<UserEntry>,
}

/// Body of `leave` requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRequest {
    /// Room to leave.
    pub room_id: RoomId,
}

/// Body of a `leave` response, fanned out to the room and echoed to the
/// leaver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveBody {
    /// The left room.
    pub room_id: RoomId,
    /// The leaving user.
    pub user_id: UserId,
}

/// Body of a `list-users` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUsersRequest {
    /// Room to enumerate.
    pub room_id: RoomId,
}

/// Body of a `list-users` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUsersBody {
    /// The enumerated room.
    pub room_id: RoomId,
    /// Users present in the room.
    pub users: Vec<UserEntry>,
}

/// Body of a `list-messages` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMessagesRequest {
    /// Room to read.
    pub room_id: RoomId,
    /// First message id; negative values are offsets from the end.
    #[serde(default)]
    pub first_message_id: i64,
    /// Page size; zero or negative selects the default.
    #[serde(default)]
    pub message_cnt: i64,
}

/// Body of a `list-messages` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMessagesBody {
    /// The read room.
    pub room_id: RoomId,
    /// Echo of the requested first id.
    pub first_message_id: i64,
    /// The messages, ascending by id.
    pub messages: Vec<MessageEntry>,
}

/// Body of a `user-info` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfoRequest {
    /// User to look up.
    pub user_id: UserId,
}

/// Body of a `room-info` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfoRequest {
    /// Room to look up.
    pub room_id: RoomId,
}
