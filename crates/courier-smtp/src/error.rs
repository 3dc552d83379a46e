//! Error types for SMTP operations.

use std::io;

use crate::connection::SessionState;
use crate::types::{ReplyClass, ReplyCode};

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error, including TLS handshake failures.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Server returned an error reply.
    #[error("SMTP error {code}: {message}")]
    SmtpError {
        /// Reply code (e.g., 550).
        code: u16,
        /// Error message from server.
        message: String,
    },

    /// Protocol error (malformed or unexpected response).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// SASL mechanism failure.
    #[error("SASL error: {0}")]
    Sasl(String),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Feature not supported by server.
    #[error("Server does not support {0}")]
    NotSupported(String),

    /// Operation not allowed in the current session state.
    #[error("Cannot {operation} in state {state:?}")]
    InvalidState {
        /// Attempted operation.
        operation: &'static str,
        /// State the session was in.
        state: SessionState,
    },
}

impl Error {
    /// Creates an SMTP error from a reply code and message.
    #[must_use]
    pub fn smtp_error(code: u16, message: impl Into<String>) -> Self {
        Self::SmtpError {
            code,
            message: message.into(),
        }
    }

    /// Returns the SMTP reply code, if this error carries one.
    #[must_use]
    pub const fn reply_code(&self) -> Option<u16> {
        match self {
            Self::SmtpError { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Class of the server reply behind this error.
    #[must_use]
    pub const fn reply_class(&self) -> Option<ReplyClass> {
        match self {
            Self::SmtpError { code, .. } => ReplyCode::new(*code).class(),
            _ => None,
        }
    }

    /// True for 5xx replies.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self.reply_class(), Some(ReplyClass::Permanent))
    }

    /// True for 4xx replies.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.reply_class(), Some(ReplyClass::Transient))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_reply_codes() {
        assert!(Error::smtp_error(550, "no such user").is_permanent());
        assert!(Error::smtp_error(451, "try later").is_transient());
        assert!(!Error::Protocol("x".into()).is_transient());
        assert_eq!(Error::smtp_error(535, "bad").reply_code(), Some(535));
    }
}
