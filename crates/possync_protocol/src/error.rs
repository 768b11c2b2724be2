//! Error types for submission validation.

use thiserror::Error;

/// Result type for validation.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Reasons a terminal submission is rejected before staging.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("missing required field: {0}")]
    MissingField(String),

    /// A value that must be a JSON object is something else.
    #[error("{0} must be a JSON object")]
    NotAnObject(String),

    /// A value that must be a JSON array is something else.
    #[error("{0} must be an array")]
    NotAnArray(String),

    /// The submission carries no line records.
    #[error("transactionRecords must contain at least one line")]
    EmptyRecords,

    /// A line record has no usable line number.
    #[error("transactionRecords[{index}] has no integer linenum")]
    InvalidLineNumber {
        /// Position of the line in the submitted array.
        index: usize,
    },

    /// A numeric field holds something that is not a number.
    #[error("{field} is not numeric: {value}")]
    NotNumeric {
        /// Path of the offending field.
        field: String,
        /// The rejected value as submitted.
        value: String,
    },
}

impl ValidationError {
    /// Creates a missing-field error.
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField(field.into())
    }
}
