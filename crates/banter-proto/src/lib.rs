//! JSON request/response protocol layer for the banter chat service.
//!
//! Sits between a full-duplex text-frame transport and the hub. Incoming
//! frames are `{request, body}` envelopes routed by verb; outgoing frames
//! are `{response, body}` envelopes. Deliveries fanned out by the hub are
//! serialized here through [`SocketConn`], the adapter from the
//! transport's [`Socket`] capability to the hub's `Conn` capability.
//!
//! The router consults three collaborators, all behind traits so the
//! front door can swap implementations: a [`UserRegistry`] (who is user
//! N), a [`RoomRegistry`] (room names and creation) and an
//! [`AccessController`] (what a user may do).

#![forbid(unsafe_code)]

pub mod access;
mod conn;
mod registry;
mod router;
pub mod wire;

pub use access::{AccessController, OpenAccess, PermFlags};
pub use conn::{Socket, SocketConn};
pub use registry::{
    RegistryError, RoomDirectory, RoomEntry, RoomRegistry, UserDirectory, UserEntry, UserRegistry,
};
pub use router::Proto;
