//! Request router.
//!
//! Decodes `{request, body}` envelopes, enforces the access policy and
//! drives the hub. Responses and side-effect notifications travel back
//! through the hub's notice fan-out, so they share the delivery order of
//! everything else a connection receives.

use banter_hub::{ConnId, Hub, MessageStore, UserId};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    access::{AccessController, CREATE_ROOM_PERM, LIST_ROOMS_PERM, READ_PERM, WRITE_PERM},
    conn::{Socket, SocketConn},
    registry::{RoomRegistry, UserRegistry},
    wire::{
        EnterBody, EnterRequest, HubMessageData, LeaveBody, LeaveRequest, ListMessagesBody,
        ListMessagesRequest, ListUsersBody, ListUsersRequest, MessageRequest, NewRoomRequest,
        Request, RoomInfoRequest, RoomListBody, RoomPermEntry, TEXT_MESSAGE_TYPE, TextMessageData,
        UserInfoRequest, WhoamiBody, envelope, error_envelope, verb,
    },
};

/// The protocol engine: one per service, shared by every connection.
pub struct Proto<S: MessageStore, U, R, A> {
    hub: Hub<S>,
    users: U,
    rooms: R,
    access: A,
}

impl<S, U, R, A> Proto<S, U, R, A>
where
    S: MessageStore,
    U: UserRegistry,
    R: RoomRegistry,
    A: AccessController,
{
    /// Wire the router to its collaborators.
    pub fn new(hub: Hub<S>, users: U, rooms: R, access: A) -> Self {
        Self { hub, users, rooms, access }
    }

    /// The hub behind this router.
    pub fn hub(&self) -> &Hub<S> {
        &self.hub
    }

    /// Register a transport socket with the hub.
    pub async fn connect<T: Socket>(&self, socket: T) -> Result<(), banter_hub::HubError> {
        self.hub.connect(SocketConn::new(socket)).await
    }

    /// Drop a connection. When this was the user's last connection, the
    /// user leaves every room it was in, with a `leave` notice fanned out
    /// to each room.
    pub async fn disconnect(&self, conn_id: ConnId) {
        let Some(conn) = self.hub.connection(conn_id).await else {
            return;
        };

        let user_id = conn.user_id();
        self.hub.disconnect(conn_id).await;

        if self.hub.user_is_connected(user_id).await {
            return;
        }

        for room_id in self.hub.user_room_ids(user_id).await {
            self.hub.leave_room(user_id, room_id).await;
            let notice = envelope(verb::LEAVE, &LeaveBody { room_id, user_id });
            if let Err(e) = self.hub.room_notice(room_id, notice).await {
                tracing::debug!(room_id, user_id, error = %e, "leave notice dropped");
            }
        }
    }

    /// Route one inbound text frame from a connection.
    ///
    /// Unknown verbs and unparseable frames are logged and ignored;
    /// handler-level failures come back as `error` responses.
    pub async fn take_request(&self, conn_id: ConnId, user_id: UserId, raw: &[u8]) {
        if !self.hub.is_connected(conn_id).await {
            return;
        }

        let request: Request = match serde_json::from_slice(raw) {
            Ok(request) => request,
            Err(e) => {
                tracing::info!(user_id, conn_id, error = %e, "unparseable request");
                return;
            },
        };

        match request.request.as_str() {
            verb::WHOAMI => self.whoami(conn_id, user_id).await,
            verb::LIST_ROOMS => self.list_rooms(conn_id, user_id).await,
            verb::IN_ROOMS => self.in_rooms(conn_id, user_id).await,
            verb::NEW_ROOM => self.create_room(conn_id, user_id, request.body).await,
            verb::ENTER => self.enter_room(conn_id, user_id, request.body).await,
            verb::LEAVE => self.leave_room(conn_id, user_id, request.body).await,
            verb::LIST_USERS => self.list_users(conn_id, user_id, request.body).await,
            verb::LIST_MESSAGES => self.list_messages(conn_id, user_id, request.body).await,
            verb::MESSAGE => self.new_message(conn_id, user_id, request.body).await,
            verb::USER_INFO => self.user_info(conn_id, user_id, request.body).await,
            verb::ROOM_INFO => self.room_info(conn_id, user_id, request.body).await,
            other => {
                tracing::info!(user_id, conn_id, verb = other, "unknown request type");
            },
        }
    }

    /// Send a response envelope to one connection.
    async fn respond(&self, conn_id: ConnId, payload: Value) {
        if let Err(e) = self.hub.conn_notice(conn_id, payload).await {
            tracing::debug!(conn_id, error = %e, "response dropped");
        }
    }

    async fn respond_error(&self, conn_id: ConnId, user_id: UserId, message: &str) {
        tracing::info!(user_id, conn_id, "{message}");
        self.respond(conn_id, error_envelope(message)).await;
    }

    /// Decode a request body, reporting decode failures to the caller.
    /// `None` means an error response was already sent.
    async fn decode<T: DeserializeOwned>(
        &self,
        conn_id: ConnId,
        user_id: UserId,
        body: Value,
    ) -> Option<T> {
        match serde_json::from_value(body) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                self.respond_error(conn_id, user_id, &e.to_string()).await;
                None
            },
        }
    }

    async fn whoami(&self, conn_id: ConnId, user_id: UserId) {
        let body =
            WhoamiBody { user: self.users.user(user_id), perm: self.access.global_perms(user_id) };
        self.respond(conn_id, envelope(verb::WHOAMI, &body)).await;
    }

    async fn list_rooms(&self, conn_id: ConnId, user_id: UserId) {
        if !self.access.has_global_perm(user_id, LIST_ROOMS_PERM) {
            self.respond_error(conn_id, user_id, "you cannot list rooms").await;
            return;
        }

        let rooms = self
            .rooms
            .list_rooms()
            .into_iter()
            .filter_map(|room| {
                let perm = self.access.room_perms(user_id, room.id);
                (perm != 0).then_some(RoomPermEntry { id: room.id, name: room.name, perm })
            })
            .collect();

        self.respond(conn_id, envelope(verb::LIST_ROOMS, &RoomListBody { rooms })).await;
    }

    async fn in_rooms(&self, conn_id: ConnId, user_id: UserId) {
        let mut rooms = Vec::new();
        for room_id in self.hub.user_room_ids(user_id).await {
            if let Some(room) = self.rooms.room(room_id) {
                let perm = self.access.room_perms(user_id, room.id);
                rooms.push(RoomPermEntry { id: room.id, name: room.name, perm });
            }
        }

        self.respond(conn_id, envelope(verb::IN_ROOMS, &RoomListBody { rooms })).await;
    }

    async fn create_room(&self, conn_id: ConnId, user_id: UserId, body: Value) {
        let Some(request) = self.decode::<NewRoomRequest>(conn_id, user_id, body).await else {
            return;
        };

        if !self.access.has_global_perm(user_id, CREATE_ROOM_PERM) {
            self.respond_error(conn_id, user_id, "you cannot create a room").await;
            return;
        }

        let name = request.name.trim();
        if name.is_empty() {
            self.respond_error(conn_id, user_id, "empty room name").await;
            return;
        }

        let room_id = match self.rooms.create_room(name) {
            Ok(room_id) => room_id,
            Err(e) => {
                self.respond_error(conn_id, user_id, &e.to_string()).await;
                return;
            },
        };

        self.access.new_room(user_id, room_id);
        let perm = self.access.room_perms(user_id, room_id);
        self.hub.new_room(room_id, 0, &[]).await;

        let body = RoomPermEntry { id: room_id, name: name.to_string(), perm };
        if let Err(e) = self.hub.global_notice(envelope(verb::NEW_ROOM, &body)).await {
            tracing::debug!(room_id, error = %e, "new-room notice dropped");
        }
    }

    async fn enter_room(&self, conn_id: ConnId, user_id: UserId, body: Value) {
        let Some(request) = self.decode::<EnterRequest>(conn_id, user_id, body).await else {
            return;
        };

        if !self.access.has_room_perm(user_id, request.room_id, READ_PERM) {
            let message = format!("you cannot enter room #{}", request.room_id);
            self.respond_error(conn_id, user_id, &message).await;
            return;
        }

        if let Err(e) = self.hub.enter_room(user_id, request.room_id).await {
            self.respond_error(conn_id, user_id, &e.to_string()).await;
            return;
        }

        let body =
            EnterBody { room_id: request.room_id, user: self.users.user(user_id) };
        let notice = envelope(verb::ENTER, &body);
        if let Err(e) = self.hub.room_notice(request.room_id, notice).await {
            tracing::debug!(room_id = request.room_id, error = %e, "enter notice dropped");
        }
    }

    async fn leave_room(&self, conn_id: ConnId, user_id: UserId, body: Value) {
        let Some(request) = self.decode::<LeaveRequest>(conn_id, user_id, body).await else {
            return;
        };

        self.hub.leave_room(user_id, request.room_id).await;

        // The leaver is no longer a room member, so the room notice will
        // miss it; echo the confirmation directly.
        let notice = envelope(verb::LEAVE, &LeaveBody { room_id: request.room_id, user_id });
        self.respond(conn_id, notice.clone()).await;
        if let Err(e) = self.hub.room_notice(request.room_id, notice).await {
            tracing::debug!(room_id = request.room_id, error = %e, "leave notice dropped");
        }
    }

    async fn list_users(&self, conn_id: ConnId, user_id: UserId, body: Value) {
        let Some(request) = self.decode::<ListUsersRequest>(conn_id, user_id, body).await else {
            return;
        };

        if !self.hub.is_in_room(user_id, request.room_id).await {
            let message = format!("you are not in room #{}", request.room_id);
            self.respond_error(conn_id, user_id, &message).await;
            return;
        }

        let mut users = Vec::new();
        for member_id in self.hub.room_user_ids(request.room_id).await {
            if let Some(entry) = self.users.user(member_id) {
                users.push(entry);
            }
        }

        let body = ListUsersBody { room_id: request.room_id, users };
        self.respond(conn_id, envelope(verb::LIST_USERS, &body)).await;
    }

    async fn list_messages(&self, conn_id: ConnId, user_id: UserId, body: Value) {
        let Some(request) = self.decode::<ListMessagesRequest>(conn_id, user_id, body).await
        else {
            return;
        };

        let count = if request.message_cnt > 0 { request.message_cnt as usize } else { 0 };
        let messages = match self
            .hub
            .messages(user_id, request.room_id, request.first_message_id, count)
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                self.respond_error(conn_id, user_id, &e.to_string()).await;
                return;
            },
        };

        let body = ListMessagesBody {
            room_id: request.room_id,
            first_message_id: request.first_message_id,
            messages,
        };
        self.respond(conn_id, envelope(verb::LIST_MESSAGES, &body)).await;
    }

    async fn new_message(&self, conn_id: ConnId, user_id: UserId, body: Value) {
        let Some(request) = self.decode::<MessageRequest>(conn_id, user_id, body).await else {
            return;
        };

        if !self.access.has_room_perm(user_id, request.room_id, WRITE_PERM) {
            let message = format!("you cannot post messages in room #{}", request.room_id);
            self.respond_error(conn_id, user_id, &message).await;
            return;
        }

        match request.message_type {
            TEXT_MESSAGE_TYPE => {
                self.new_text_message(conn_id, user_id, request.room_id, request.data).await;
            },
            other => {
                let message = format!("unknown message type: {other}");
                self.respond_error(conn_id, user_id, &message).await;
            },
        }
    }

    async fn new_text_message(
        &self,
        conn_id: ConnId,
        user_id: UserId,
        room_id: banter_hub::RoomId,
        data: Value,
    ) {
        let Some(text) = self.decode::<TextMessageData>(conn_id, user_id, data).await else {
            return;
        };

        let text = text.text.trim();
        if text.is_empty() {
            self.respond_error(conn_id, user_id, "empty message text").await;
            return;
        }

        let hub_data = HubMessageData {
            message_type: TEXT_MESSAGE_TYPE,
            data: serde_json::json!({ "text": text }),
        };
        let payload = match serde_json::to_value(&hub_data) {
            Ok(payload) => payload,
            Err(e) => {
                self.respond_error(conn_id, user_id, &e.to_string()).await;
                return;
            },
        };

        if let Err(e) = self.hub.new_message(conn_id, room_id, payload).await {
            self.respond_error(conn_id, user_id, &e.to_string()).await;
        }
    }

    async fn user_info(&self, conn_id: ConnId, user_id: UserId, body: Value) {
        let Some(request) = self.decode::<UserInfoRequest>(conn_id, user_id, body).await else {
            return;
        };

        let Some(entry) = self.users.user(request.user_id) else {
            let message = format!("user #{} not found", request.user_id);
            self.respond_error(conn_id, user_id, &message).await;
            return;
        };

        self.respond(conn_id, envelope(verb::USER_INFO, &entry)).await;
    }

    async fn room_info(&self, conn_id: ConnId, user_id: UserId, body: Value) {
        let Some(request) = self.decode::<RoomInfoRequest>(conn_id, user_id, body).await else {
            return;
        };

        let perm = self.access.room_perms(user_id, request.room_id);
        let room = self.rooms.room(request.room_id).filter(|_| perm != 0);
        let Some(room) = room else {
            let message = format!("room #{} not found", request.room_id);
            self.respond_error(conn_id, user_id, &message).await;
            return;
        };

        let body = RoomPermEntry { id: room.id, name: room.name, perm };
        self.respond(conn_id, envelope(verb::ROOM_INFO, &body)).await;
    }
}
