//! Connection capability.

use serde_json::Value;

use crate::entry::{ConnId, MessageEntry, UserId};

/// The hub-facing side of one live client connection.
///
/// A `Conn` is created and owned by the transport layer and registered
/// with the hub by id; the hub drops its reference on disconnect and the
/// transport independently tears down the socket.
///
/// Delivery callbacks execute on dispatcher worker tasks: implementors
/// must be thread-safe and non-blocking (or self-bounded, e.g. by handing
/// the payload to an outbound channel). A panic inside a callback is
/// caught by the worker and logged; it never propagates out of the pool.
pub trait Conn: Send + Sync + 'static {
    /// Hub-unique connection id.
    fn id(&self) -> ConnId;

    /// Owning user id. Many connections may share one user.
    fn user_id(&self) -> UserId;

    /// A message newly published in a room this connection's user is in.
    fn new_message(&self, entry: &MessageEntry);

    /// An in-place payload update to a previously published message.
    fn update_message(&self, entry: &MessageEntry);

    /// An opaque event fanned out by the hub; the hub does not interpret
    /// its payload.
    fn notice(&self, data: &Value);
}
