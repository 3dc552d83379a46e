//! Error types for MIME operations.

use std::io;

/// Result type alias for MIME operations.
pub type Result<T> = std::result::Result<T, Error>;

/// MIME error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error while writing the message body.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A required message field is empty.
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    /// Header value would break the header block.
    #[error("Invalid MIME header {name}: {reason}")]
    InvalidHeader {
        /// Header name.
        name: String,
        /// Why the header was rejected.
        reason: &'static str,
    },
}

impl Error {
    pub(crate) fn invalid_header(name: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidHeader {
            name: name.into(),
            reason,
        }
    }
}
