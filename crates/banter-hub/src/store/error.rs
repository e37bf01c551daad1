//! Store error types.

use thiserror::Error;

/// Errors surfaced by a [`MessageStore`](super::MessageStore)
/// implementation. The hub forwards them verbatim to callers; errors hit
/// during a timer- or threshold-triggered flush leave the buffer intact.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// I/O error (file system, database, network storage).
    #[error("I/O error: {0}")]
    Io(String),

    /// Failed to encode or decode stored data.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The backing storage rejected the operation or is unreachable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}
