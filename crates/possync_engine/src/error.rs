//! Error types for the sync engine.

use possync_staging::StagingError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while talking to the upstream.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The call did not complete within the configured timeout.
    #[error("operation timed out")]
    Timeout,

    /// The upstream answered with a non-success status.
    #[error("upstream returned {status}: {message}")]
    Upstream {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },

    /// The staging store failed.
    #[error("staging error: {0}")]
    Staging(#[from] StagingError),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates an upstream status error.
    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            message: message.into(),
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            SyncError::Upstream { status, .. } => *status >= 500 || *status == 429,
            SyncError::Staging(_) => false,
        }
    }

    /// Returns the upstream status code, if the upstream answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            SyncError::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection refused").is_retryable());
        assert!(!SyncError::transport_fatal("invalid url").is_retryable());
        assert!(SyncError::Timeout.is_retryable());
        assert!(SyncError::upstream(503, "maintenance").is_retryable());
        assert!(SyncError::upstream(429, "slow down").is_retryable());
        assert!(!SyncError::upstream(422, "bad line").is_retryable());
        assert!(!SyncError::Staging(StagingError::Corrupted {
            line: 3,
            message: "garbage".into(),
        })
        .is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::upstream(500, "boom");
        assert_eq!(err.to_string(), "upstream returned 500: boom");
        assert_eq!(err.status(), Some(500));
        assert_eq!(SyncError::Timeout.status(), None);
    }
}
