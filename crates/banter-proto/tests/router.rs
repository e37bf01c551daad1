//! End-to-end protocol flows over an in-memory hub.

#![allow(clippy::unwrap_used)]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use banter_hub::{ConnId, Hub, MemoryStore, UserId};
use banter_proto::{OpenAccess, Proto, RoomDirectory, Socket, UserDirectory};
use serde_json::{Value, json};

type Service = Proto<MemoryStore, UserDirectory, RoomDirectory, OpenAccess>;

/// Everything a test socket has been asked to send, parsed back to JSON.
#[derive(Clone, Default)]
struct FrameLog {
    frames: Arc<Mutex<Vec<Value>>>,
}

impl FrameLog {
    fn frames(&self) -> Vec<Value> {
        self.frames.lock().unwrap().clone()
    }

    /// Bodies of every frame with the given response verb.
    fn bodies(&self, verb: &str) -> Vec<Value> {
        self.frames()
            .into_iter()
            .filter(|frame| frame["response"] == verb)
            .map(|frame| frame["body"].clone())
            .collect()
    }

    async fn wait_for(&self, verb: &str, count: usize) -> Vec<Value> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let bodies = self.bodies(verb);
            if bodies.len() >= count {
                return bodies;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {count} {verb:?} frames; saw {:?}",
                self.frames()
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[derive(Clone)]
struct TestSocket {
    id: ConnId,
    user_id: UserId,
    log: FrameLog,
}

impl Socket for TestSocket {
    fn id(&self) -> ConnId {
        self.id
    }

    fn user_id(&self) -> UserId {
        self.user_id
    }

    fn send(&self, frame: &[u8]) {
        let value: Value = serde_json::from_slice(frame).unwrap();
        self.log.frames.lock().unwrap().push(value);
    }

    fn close(&self) {}

    fn is_alive(&self) -> bool {
        true
    }
}

async fn service() -> (Service, UserDirectory) {
    let users = UserDirectory::new();
    let hub = Hub::new(MemoryStore::new());
    hub.set_flush_delay(Duration::ZERO).await;
    hub.start().await;
    let proto = Proto::new(hub, users.clone(), RoomDirectory::new(), OpenAccess);
    (proto, users)
}

async fn connect(proto: &Service, users: &UserDirectory, conn_id: ConnId, name: &str) -> TestSocket {
    let user_id = users.add_user(name);
    let socket = TestSocket { id: conn_id, user_id, log: FrameLog::default() };
    proto.connect(socket.clone()).await.unwrap();
    socket
}

async fn request(proto: &Service, socket: &TestSocket, payload: Value) {
    proto.take_request(socket.id, socket.user_id, payload.to_string().as_bytes()).await;
}

#[tokio::test]
async fn whoami_reports_user_and_perms() {
    let (proto, users) = service().await;
    let alice = connect(&proto, &users, 1, "alice").await;

    request(&proto, &alice, json!({"request": "whoami"})).await;

    let bodies = alice.log.wait_for("whoami", 1).await;
    assert_eq!(bodies[0]["user"]["name"], "alice");
    assert_eq!(bodies[0]["user"]["id"], alice.user_id);
    assert_eq!(bodies[0]["perm"], 3);

    proto.hub().stop().await;
}

#[tokio::test]
async fn create_enter_post_flow() {
    let (proto, users) = service().await;
    let alice = connect(&proto, &users, 1, "alice").await;
    let bob = connect(&proto, &users, 2, "bob").await;

    // Room creation is announced globally.
    request(&proto, &alice, json!({"request": "new-room", "body": {"name": " lobby "}})).await;
    let created = bob.log.wait_for("new-room", 1).await;
    assert_eq!(created[0]["name"], "lobby");
    let room_id = created[0]["id"].as_u64().unwrap();

    // Both enter; the second enter is announced to the first member too.
    request(&proto, &alice, json!({"request": "enter", "body": {"roomId": room_id}})).await;
    request(&proto, &bob, json!({"request": "enter", "body": {"roomId": room_id}})).await;
    let seen_by_alice = alice.log.wait_for("enter", 2).await;
    assert_eq!(seen_by_alice[1]["user"]["name"], "bob");

    // A posted text message fans out to every member.
    request(
        &proto,
        &alice,
        json!({
            "request": "message",
            "body": {"roomId": room_id, "messageType": 1, "data": {"text": "hi all"}},
        }),
    )
    .await;

    for socket in [&alice, &bob] {
        let messages = socket.log.wait_for("message", 1).await;
        assert_eq!(messages[0]["roomId"], room_id);
        assert_eq!(messages[0]["messageId"], 1);
        assert_eq!(messages[0]["userId"], alice.user_id);
        assert_eq!(messages[0]["data"], json!({"messageType": 1, "data": {"text": "hi all"}}));
    }

    // History and member listing agree.
    request(&proto, &bob, json!({"request": "list-messages", "body": {"roomId": room_id}})).await;
    let history = bob.log.wait_for("list-messages", 1).await;
    assert_eq!(history[0]["messages"].as_array().unwrap().len(), 1);

    request(&proto, &bob, json!({"request": "list-users", "body": {"roomId": room_id}})).await;
    let listed = bob.log.wait_for("list-users", 1).await;
    assert_eq!(listed[0]["users"].as_array().unwrap().len(), 2);

    request(&proto, &bob, json!({"request": "in-rooms"})).await;
    let in_rooms = bob.log.wait_for("in-rooms", 1).await;
    assert_eq!(in_rooms[0]["rooms"][0]["name"], "lobby");

    request(&proto, &bob, json!({"request": "room-info", "body": {"roomId": room_id}})).await;
    let info = bob.log.wait_for("room-info", 1).await;
    assert_eq!(info[0]["name"], "lobby");

    // Leaving is echoed to the leaver and announced to the room.
    request(&proto, &bob, json!({"request": "leave", "body": {"roomId": room_id}})).await;
    bob.log.wait_for("leave", 1).await;
    let seen = alice.log.wait_for("leave", 1).await;
    assert_eq!(seen[0]["userId"], bob.user_id);
    assert!(!proto.hub().is_in_room(bob.user_id, room_id).await);

    proto.hub().disconnect(1).await;
    proto.hub().disconnect(2).await;
    proto.hub().stop().await;
}

#[tokio::test]
async fn failures_come_back_as_error_envelopes() {
    let (proto, users) = service().await;
    let alice = connect(&proto, &users, 1, "alice").await;

    // Entering a room the hub does not know.
    request(&proto, &alice, json!({"request": "enter", "body": {"roomId": 99}})).await;
    let errors = alice.log.wait_for("error", 1).await;
    assert_eq!(errors[0]["message"], "room 99 not found");

    // Posting an empty message.
    request(
        &proto,
        &alice,
        json!({
            "request": "message",
            "body": {"roomId": 1, "messageType": 1, "data": {"text": "   "}},
        }),
    )
    .await;
    let errors = alice.log.wait_for("error", 2).await;
    assert_eq!(errors[1]["message"], "empty message text");

    // Posting an unknown message type.
    request(
        &proto,
        &alice,
        json!({
            "request": "message",
            "body": {"roomId": 1, "messageType": 9, "data": {}},
        }),
    )
    .await;
    let errors = alice.log.wait_for("error", 3).await;
    assert_eq!(errors[2]["message"], "unknown message type: 9");

    // Creating a duplicate room.
    request(&proto, &alice, json!({"request": "new-room", "body": {"name": "lobby"}})).await;
    alice.log.wait_for("new-room", 1).await;
    request(&proto, &alice, json!({"request": "new-room", "body": {"name": "lobby"}})).await;
    let errors = alice.log.wait_for("error", 4).await;
    assert_eq!(errors[3]["message"], "room \"lobby\" already exists");

    // Creating a room with a blank name.
    request(&proto, &alice, json!({"request": "new-room", "body": {"name": "  "}})).await;
    let errors = alice.log.wait_for("error", 5).await;
    assert_eq!(errors[4]["message"], "empty room name");

    // Looking up an unknown user.
    request(&proto, &alice, json!({"request": "user-info", "body": {"userId": 777}})).await;
    let errors = alice.log.wait_for("error", 6).await;
    assert_eq!(errors[5]["message"], "user #777 not found");

    // Unknown verbs are ignored, not answered.
    request(&proto, &alice, json!({"request": "dance"})).await;
    request(&proto, &alice, json!({"request": "whoami"})).await;
    alice.log.wait_for("whoami", 1).await;
    assert!(alice.log.bodies("dance").is_empty());

    proto.hub().disconnect(1).await;
    proto.hub().stop().await;
}

#[tokio::test]
async fn last_disconnect_leaves_rooms_with_notices() {
    let (proto, users) = service().await;
    let alice_a = connect(&proto, &users, 1, "alice").await;
    let alice_b = TestSocket { id: 2, ..alice_a.clone() };
    proto.connect(alice_b.clone()).await.unwrap();
    let bob = connect(&proto, &users, 3, "bob").await;

    request(&proto, &alice_a, json!({"request": "new-room", "body": {"name": "lobby"}})).await;
    let created = bob.log.wait_for("new-room", 1).await;
    let room_id = created[0]["id"].as_u64().unwrap();

    request(&proto, &alice_a, json!({"request": "enter", "body": {"roomId": room_id}})).await;
    request(&proto, &bob, json!({"request": "enter", "body": {"roomId": room_id}})).await;
    bob.log.wait_for("enter", 2).await;

    // Alice still holds a second connection: no leave yet.
    proto.disconnect(1).await;
    assert!(proto.hub().is_in_room(alice_a.user_id, room_id).await);

    // Dropping the last connection leaves the room and tells the room.
    proto.disconnect(2).await;
    assert!(!proto.hub().is_in_room(alice_a.user_id, room_id).await);
    let leaves = bob.log.wait_for("leave", 1).await;
    assert_eq!(leaves[0]["userId"], alice_a.user_id);

    proto.hub().disconnect(3).await;
    proto.hub().stop().await;
}
