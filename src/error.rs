//! Error types for `ringwal`.

use std::path::PathBuf;

/// Result type for log operations.
pub type WalResult<T> = Result<T, WalError>;

/// Errors returned by the `ringwal` crate.
#[derive(thiserror::Error, Debug)]
pub enum WalError {
    /// I/O error from the underlying filesystem.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration (rejected at open, never clamped).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid argument to an operation (bad directory path, oversized payload).
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// A file in the log directory does not follow the segment naming scheme.
    #[error("invalid segment file name: {0}")]
    InvalidSegmentName(String),

    /// Checksum mismatch or a truncated block header/payload.
    #[error("corrupt block at byte {offset}: {reason}")]
    Corrupt {
        /// Byte offset (within the decoded buffer) of the block that failed validation.
        offset: usize,
        /// Short, human-readable description of the failure.
        reason: String,
    },

    /// The active segment cannot hold the next block.
    ///
    /// Internal capacity signal: `Log::write` always recovers from it by rotating.
    #[error("segment full")]
    SegmentFull,

    /// The circular block-id space is exhausted; truncate before writing again.
    #[error("wal full: block id space exhausted")]
    WalFull,

    /// The block id is not stored in the segment that was consulted.
    #[error("block {0} not found")]
    NotFound(i64),

    /// The block id lies outside the live window.
    #[error("block {block_id} outside live range (first={first:?}, last={last:?})")]
    OutOfRange {
        /// Requested block id.
        block_id: i64,
        /// First live block id, if any.
        first: Option<i64>,
        /// Last live block id, if any.
        last: Option<i64>,
    },

    /// The log has been closed.
    #[error("log is closed")]
    Closed,

    /// The log detected corruption and refuses further operations.
    #[error("log is corrupted")]
    Corrupted,

    /// The background sync thread failed; the log refuses further operations.
    #[error("background sync failed")]
    BackgroundFailed,

    /// Lock acquisition failed (poisoned in-memory lock).
    #[error("lock failed on {resource}: {reason}")]
    LockFailed {
        /// What we were trying to lock.
        resource: String,
        /// Human-readable reason.
        reason: String,
    },

    /// Another `Log` holds the directory lock.
    #[error("directory already locked: {0}")]
    DirLocked(PathBuf),

    /// Encoding error (typed payload helpers).
    #[error("encode error: {0}")]
    Encode(String),

    /// Decoding error (typed payload helpers).
    #[error("decode error: {0}")]
    Decode(String),
}

/// Coarse classification of [`WalError`] for callers deciding how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid option values or arguments.
    Configuration,
    /// Filesystem failure (safe to retry the operation).
    Io,
    /// Checksum or framing failure.
    Corrupt,
    /// `WalFull` / `SegmentFull`: truncate, then retry.
    Capacity,
    /// Terminal log state: reopen required.
    State,
    /// Block id outside the live window.
    Range,
}

impl WalError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            WalError::Io(_) | WalError::LockFailed { .. } | WalError::DirLocked(_) => {
                ErrorKind::Io
            }
            WalError::InvalidConfig(_)
            | WalError::InvalidParam(_)
            | WalError::Encode(_)
            | WalError::Decode(_) => ErrorKind::Configuration,
            WalError::InvalidSegmentName(_) | WalError::Corrupt { .. } => ErrorKind::Corrupt,
            WalError::SegmentFull | WalError::WalFull => ErrorKind::Capacity,
            WalError::Closed | WalError::Corrupted | WalError::BackgroundFailed => {
                ErrorKind::State
            }
            WalError::NotFound(_) | WalError::OutOfRange { .. } => ErrorKind::Range,
        }
    }

    /// True if the `Log` that returned this error is unusable and must be reopened.
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::State
    }

    pub(crate) fn corrupt(offset: usize, reason: impl Into<String>) -> Self {
        WalError::Corrupt {
            offset,
            reason: reason.into(),
        }
    }
}
