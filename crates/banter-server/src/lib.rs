//! banter production server.
//!
//! Wraps the protocol layer with real I/O: an axum HTTP front door
//! (name-based login with session cookies, whoami/logout, static file
//! routes) and a WebSocket transport whose text frames feed the protocol
//! router. The hub itself lives in `banter-hub`; this crate is glue.

#![forbid(unsafe_code)]

mod config;
mod http;
mod session;
mod ws;

use banter_hub::MemoryStore;
use banter_proto::{OpenAccess, Proto, RoomDirectory, UserDirectory};

pub use config::{ConfigError, HubTunables, ServerConfig, SessionConfig, StaticRoute};
pub use http::{AppState, router};
pub use session::{Session, SessionRegistry};

/// The concrete protocol stack this server runs: in-memory store,
/// in-RAM user/room directories, permit-all access policy.
pub type ChatService = Proto<MemoryStore, UserDirectory, RoomDirectory, OpenAccess>;
