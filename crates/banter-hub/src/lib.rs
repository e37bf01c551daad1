//! In-memory coordination engine for the banter chat service.
//!
//! The hub owns connection registration, room membership, message ordering
//! and buffered persistence, and the fan-out dispatcher that delivers
//! messages and notices to every eligible connection under concurrent
//! mutation. It is transport-agnostic: the outer protocol layer adapts a
//! socket to the [`Conn`] capability and registers it here.
//!
//! # Architecture
//!
//! - [`Hub`]: the public API (connect/disconnect, rooms, messages, notices,
//!   queries, lifecycle). Cheap to clone; all clones share one engine.
//! - [`MessageStore`]: the pluggable persistence contract, with
//!   [`MemoryStore`] as the reference implementation.
//! - A single-consumer dispatcher expands each published task into
//!   per-connection parcels and feeds a fixed worker pool; per-task
//!   completion is barriered, which yields per-room FIFO delivery at every
//!   recipient.
//!
//! # Locking
//!
//! Four logical locks guard the hub state, always acquired in ascending
//! order and released in reverse:
//!
//! 1. flush control (flush exclusion, tunables, timer state)
//! 2. message buffer (unflushed tail)
//! 3. connection table (connections by id, connection ids by user)
//! 4. room table (membership, per-room message counters)

#![forbid(unsafe_code)]

mod buffer;
mod config;
mod conn;
mod dispatch;
mod entry;
mod error;
mod hub;
mod state;
pub mod store;

pub use config::{DEFAULT_FLUSH_DELAY, DEFAULT_FLUSH_ITEMS, DEFAULT_FLUSH_THRESHOLD, DEFAULT_SENDERS};
pub use conn::Conn;
pub use entry::{ConnId, MessageEntry, MessageId, RoomId, UserId};
pub use error::HubError;
pub use hub::Hub;
pub use store::{MemoryStore, MessageStore, StoreError};
