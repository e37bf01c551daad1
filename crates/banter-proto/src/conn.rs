//! Adapter from the transport's socket capability to the hub's `Conn`
//! capability.

use std::sync::Arc;

use banter_hub::{Conn, ConnId, MessageEntry, UserId};
use serde_json::Value;

use crate::wire::{envelope, verb};

/// The transport's side of one live connection.
///
/// Implementors are expected to be cheap handles (an id pair plus an
/// outbound channel): `send` must not block, and delivery failures are
/// the transport's problem (typically it closes the socket).
pub trait Socket: Send + Sync + 'static {
    /// Hub-unique connection id.
    fn id(&self) -> ConnId;

    /// Authenticated user behind the socket.
    fn user_id(&self) -> UserId;

    /// Queue one text frame for the client.
    fn send(&self, frame: &[u8]);

    /// Tear the socket down.
    fn close(&self);

    /// Whether the socket is still usable.
    fn is_alive(&self) -> bool;
}

/// Hub-side wrapper of a [`Socket`]: serializes hub deliveries into wire
/// envelopes and pushes them onto the socket.
///
/// New messages go out as `message` responses, updates as
/// `message-update` responses. Notices pass through untouched: the
/// router publishes complete envelopes as notice payloads.
pub struct SocketConn<T: Socket> {
    socket: T,
}

impl<T: Socket> SocketConn<T> {
    /// Wrap a socket for registration with the hub.
    pub fn new(socket: T) -> Arc<Self> {
        Arc::new(Self { socket })
    }

    fn send_value(&self, value: &Value) {
        match serde_json::to_vec(value) {
            Ok(frame) => self.socket.send(&frame),
            Err(e) => {
                tracing::warn!(conn_id = self.socket.id(), error = %e, "dropping unencodable frame");
            },
        }
    }
}

impl<T: Socket> Conn for SocketConn<T> {
    fn id(&self) -> ConnId {
        self.socket.id()
    }

    fn user_id(&self) -> UserId {
        self.socket.user_id()
    }

    fn new_message(&self, entry: &MessageEntry) {
        self.send_value(&envelope(verb::MESSAGE, entry));
    }

    fn update_message(&self, entry: &MessageEntry) {
        self.send_value(&envelope(verb::MESSAGE_UPDATE, entry));
    }

    fn notice(&self, data: &Value) {
        self.send_value(data);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct FrameSink {
        frames: Mutex<Vec<Value>>,
    }

    struct TestSocket {
        sink: Arc<FrameSink>,
    }

    #[allow(clippy::unwrap_used)]
    impl Socket for TestSocket {
        fn id(&self) -> ConnId {
            42
        }

        fn user_id(&self) -> UserId {
            7
        }

        fn send(&self, frame: &[u8]) {
            let value = serde_json::from_slice(frame).unwrap();
            self.sink.frames.lock().unwrap().push(value);
        }

        fn close(&self) {}

        fn is_alive(&self) -> bool {
            true
        }
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn deliveries_become_wire_envelopes() {
        let sink = Arc::new(FrameSink::default());
        let conn = SocketConn::new(TestSocket { sink: Arc::clone(&sink) });

        assert_eq!(conn.id(), 42);
        assert_eq!(conn.user_id(), 7);

        let entry = MessageEntry {
            room_id: 1,
            message_id: 3,
            user_id: 7,
            timestamp: 99,
            data: json!({"messageType": 1, "data": {"text": "hi"}}),
        };

        conn.new_message(&entry);
        conn.update_message(&entry);
        conn.notice(&json!({"response": "enter", "body": {"roomId": 1}}));

        let frames = sink.frames.lock().unwrap().clone();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0]["response"], "message");
        assert_eq!(frames[0]["body"]["messageId"], 3);
        assert_eq!(frames[1]["response"], "message-update");
        assert_eq!(frames[2]["response"], "enter");
    }
}
