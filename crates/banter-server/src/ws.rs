//! WebSocket transport.
//!
//! Each upgraded socket gets a read loop feeding the protocol router and
//! a write loop draining an unbounded outbound channel. The channel's
//! sender side is the [`Socket`] capability handed to the protocol
//! layer, so hub workers never block on a slow client.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use axum::extract::ws::{Message, WebSocket};
use banter_hub::{ConnId, UserId};
use banter_proto::Socket;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::http::AppState;

enum Outbound {
    Frame(Vec<u8>),
    Close,
}

/// The transport's connection handle: identity plus the outbound queue.
#[derive(Clone)]
struct WsSocket {
    conn_id: ConnId,
    user_id: UserId,
    out_tx: mpsc::UnboundedSender<Outbound>,
    alive: Arc<AtomicBool>,
}

impl Socket for WsSocket {
    fn id(&self) -> ConnId {
        self.conn_id
    }

    fn user_id(&self) -> UserId {
        self.user_id
    }

    fn send(&self, frame: &[u8]) {
        if !self.is_alive() {
            return;
        }
        if self.out_tx.send(Outbound::Frame(frame.to_vec())).is_err() {
            self.alive.store(false, Ordering::SeqCst);
        }
    }

    fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
        let _ = self.out_tx.send(Outbound::Close);
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

/// Drive one upgraded socket until the client goes away, then unregister
/// it from the protocol layer.
pub(crate) async fn serve_socket(
    state: AppState,
    socket: WebSocket,
    conn_id: ConnId,
    user_id: UserId,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    let alive = Arc::new(AtomicBool::new(true));

    let handle = WsSocket { conn_id, user_id, out_tx, alive: Arc::clone(&alive) };
    if let Err(e) = state.service().connect(handle.clone()).await {
        tracing::info!(conn_id, user_id, error = %e, "websocket rejected");
        return;
    }

    tracing::debug!(conn_id, user_id, "websocket connected");

    let writer = tokio::spawn(async move {
        while let Some(outbound) = out_rx.recv().await {
            match outbound {
                Outbound::Frame(bytes) => {
                    let Ok(text) = String::from_utf8(bytes) else {
                        continue;
                    };
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                },
                Outbound::Close => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                },
            }
        }
    });

    while let Some(message) = ws_rx.next().await {
        match message {
            Ok(Message::Text(text)) => {
                state.service().take_request(conn_id, user_id, text.as_bytes()).await;
            },
            Ok(Message::Binary(_)) => {
                tracing::info!(conn_id, "unexpected binary frame; closing");
                break;
            },
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_) | Message::Pong(_)) => {},
            Err(e) => {
                tracing::debug!(conn_id, error = %e, "websocket read failed");
                break;
            },
        }
    }

    alive.store(false, Ordering::SeqCst);
    state.service().disconnect(conn_id).await;

    // Dropping the handle closes the outbound channel once the hub has
    // released its reference; the writer drains and exits.
    drop(handle);
    let _ = writer.await;

    tracing::debug!(conn_id, user_id, "websocket closed");
}
