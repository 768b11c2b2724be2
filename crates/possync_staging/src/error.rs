//! Error types for staging operations.

use std::io;
use thiserror::Error;

/// Result type for staging operations.
pub type StagingResult<T> = Result<T, StagingError>;

/// Errors that can occur while staging records.
#[derive(Debug, Error)]
pub enum StagingError {
    /// An I/O error occurred on the journal.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The journal contains an unreadable entry that is not the last one.
    #[error("journal corrupted at line {line}: {message}")]
    Corrupted {
        /// One-based line number of the bad entry.
        line: usize,
        /// Parser message.
        message: String,
    },

    /// A record could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
