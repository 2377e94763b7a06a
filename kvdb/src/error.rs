//! Error kinds returned by every public operation.
//!
//! There is exactly one error type for the crate. Every failure mode named in
//! the database's operation contracts (transaction state, index management,
//! persistence, shrink) has its own variant so callers can match on it instead
//! of parsing strings.

use std::fmt;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The key does not exist, or has already expired.
    #[error("not found")]
    NotFound,

    /// The transaction has already committed or rolled back.
    #[error("tx closed")]
    TxClosed,

    /// A write operation (or index mutation) was attempted on a read-only
    /// transaction.
    #[error("tx not writable")]
    TxNotWritable,

    /// A mutation was attempted against a tree while it was being iterated.
    #[error("tx iterating")]
    TxIterating,

    /// `create_index`/`create_spatial_index` was called with a name that is
    /// already registered.
    #[error("index exists")]
    IndexExists,

    /// A request was made that's nonsensical for the receiver, e.g. manual
    /// commit/rollback on a managed transaction.
    #[error("invalid operation")]
    InvalidOperation,

    /// `SetConfig` was called with a sync policy that isn't one of
    /// `never`/`every_second`/`always`.
    #[error("invalid sync policy")]
    InvalidSyncPolicy,

    /// A shrink was requested while one was already in progress.
    #[error("shrink in process")]
    ShrinkInProcess,

    /// The on-disk file failed RESP validation on load.
    #[error("invalid database: {0}")]
    InvalidDatabase(String),

    /// An operation was attempted after `close()`.
    #[error("database closed")]
    DatabaseClosed,

    /// The reader/writer lock was found poisoned by a panic in another
    /// thread. This is a programming error elsewhere in the process; it is
    /// still returned rather than propagated as a panic so a caller holding
    /// only a read transaction isn't brought down by a writer's bug.
    #[error("lock poisoned")]
    Lock,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Error::Lock
    }
}

/// A lightweight marker used by range-rectangle parsing errors; kept as a
/// `String` message under `InvalidDatabase`-adjacent contexts is overkill for
/// a parse helper, so rect parsing uses this instead.
#[derive(Debug)]
pub struct ParseRectError(pub String);

impl fmt::Display for ParseRectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid rect string: {}", self.0)
    }
}

impl std::error::Error for ParseRectError {}

impl From<ParseRectError> for Error {
    fn from(_: ParseRectError) -> Self {
        Error::InvalidOperation
    }
}
