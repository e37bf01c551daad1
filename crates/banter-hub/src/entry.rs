//! Message entry and identifier types shared by the hub, the store and the
//! wire protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Hub-unique connection identifier. Never reused while the hub runs.
/// Zero is reserved: system-originated messages carry `conn_id == 0`.
pub type ConnId = u64;

/// User identifier. Many connections may share one user. Zero is the
/// system sentinel, mirroring [`ConnId`].
pub type UserId = u64;

/// Room identifier.
pub type RoomId = u64;

/// Position of a message in its room's sequence. Strictly increasing by
/// one per accepted message, with no gaps and no duplicates.
pub type MessageId = u64;

/// A single chat message as accepted by the hub.
///
/// `user_id` is zero iff the message was injected by the system (no
/// originating connection). `timestamp` is the wall-clock second at
/// acceptance. `data` is opaque to the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEntry {
    /// Room the message was posted to.
    pub room_id: RoomId,
    /// Position in the room's message sequence.
    pub message_id: MessageId,
    /// Posting user; zero for system messages.
    pub user_id: UserId,
    /// Seconds since the Unix epoch at acceptance.
    pub timestamp: i64,
    /// Opaque payload; the hub never interprets it.
    pub data: Value,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn entry_serializes_camel_case() {
        let entry = MessageEntry {
            room_id: 3,
            message_id: 17,
            user_id: 5,
            timestamp: 1_700_000_000,
            data: json!({"text": "hello"}),
        };

        let encoded = serde_json::to_value(&entry).expect("encode failed");
        assert_eq!(
            encoded,
            json!({
                "roomId": 3,
                "messageId": 17,
                "userId": 5,
                "timestamp": 1_700_000_000,
                "data": {"text": "hello"},
            })
        );
    }

    #[test]
    fn entry_round_trips() {
        let entry = MessageEntry {
            room_id: 1,
            message_id: 2,
            user_id: 0,
            timestamp: 42,
            data: json!("system said so"),
        };

        let encoded = serde_json::to_string(&entry).expect("encode failed");
        let decoded: MessageEntry = serde_json::from_str(&encoded).expect("decode failed");
        assert_eq!(decoded, entry);
    }
}
