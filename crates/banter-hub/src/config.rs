//! Tunable defaults.
//!
//! All of these can be changed per hub through the setters on
//! [`Hub`](crate::Hub); the flush-related setters are serialized against
//! the flush engine, and the sender count takes effect at start.

use std::time::Duration;

/// Default number of dispatcher workers.
pub const DEFAULT_SENDERS: usize = 10;

/// Default period of the timer-driven flush. Zero disables the timer.
pub const DEFAULT_FLUSH_DELAY: Duration = Duration::from_secs(30);

/// Default size of the slices handed to [`MessageStore::save`] per flush.
///
/// [`MessageStore::save`]: crate::store::MessageStore::save
pub const DEFAULT_FLUSH_ITEMS: usize = 20;

/// Default buffer length above which an append triggers an inline flush.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 50;

/// Capacity of the bounded task queue between publishers and the
/// dispatcher. Sending blocks when full; this is the only backpressure
/// point on the publisher path.
pub(crate) const TASK_QUEUE_LEN: usize = 10;

/// Default page size of the `messages` query when the caller passes zero.
pub(crate) const DEFAULT_MESSAGE_COUNT: usize = 10;
