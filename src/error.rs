//! Error types returned from proxy buffer operations.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum BufferError {
    /// Returned by `add_*` when the arena has no room and eviction could not
    /// free enough space to satisfy the request.
    #[error("not enough memory in buffer")]
    NoMemory,

    /// Returned when a database operation fails or the database is
    /// unreachable. The flush loop retries on this.
    #[error("database unavailable: {0}")]
    DbDown(String),

    /// Returned from introspection and mutating calls once `disable()` has
    /// been called on the buffer.
    #[error("buffer has been disabled")]
    Disabled,

    /// Returned by `Mode::parse` for any string other than
    /// `"", "disk", "memory", "hybrid"`.
    #[error("invalid buffer mode: {0}")]
    InvalidMode(String),
}

pub type Result<T> = std::result::Result<T, BufferError>;
