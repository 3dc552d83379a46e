//! Error types for the core library.

use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;
use crate::crypto::CryptoError;

/// Broad class of a send failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Rejected before any network activity.
    Configuration,
    /// Dial, greeting, EHLO or TLS failed.
    Connectivity,
    /// The server refused the credentials or the SASL exchange broke.
    Authentication,
    /// The `OAuth2` refresh grant or its persistence failed.
    TokenRefresh,
    /// MAIL, RCPT or DATA failed.
    Transfer,
    /// The configured deadline elapsed.
    Timeout,
}

/// Errors that can occur while sending.
#[derive(Debug, Error)]
pub enum Error {
    /// Engine configuration is unusable.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Account or credential fields are invalid.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The message could not be built.
    #[error("Message error: {0}")]
    Message(#[from] courier_mime::Error),

    /// The stored password could not be decrypted.
    #[error("Encryption error: {0}")]
    Encryption(#[from] CryptoError),

    /// The account has no authentication configured.
    #[error("Account has no supported authentication configured")]
    UnsupportedAuthentication,

    /// Could not establish the SMTP session.
    #[error("Connection failed: {0}")]
    Connectivity(#[source] courier_smtp::Error),

    /// The server rejected authentication.
    #[error("Authentication failed: {0}")]
    Authentication(#[source] courier_smtp::Error),

    /// Refreshing the `OAuth2` token failed.
    #[error("Token refresh failed: {0}")]
    TokenRefresh(#[source] courier_oauth::Error),

    /// The mail transaction failed.
    #[error("Transfer failed: {0}")]
    Transfer(#[source] courier_smtp::Error),

    /// The send did not finish in time.
    #[error("Send timed out after {0:?}")]
    Timeout(Duration),
}

impl Error {
    /// Failure class.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_)
            | Self::Validation(_)
            | Self::Message(_)
            | Self::Encryption(_)
            | Self::UnsupportedAuthentication => ErrorKind::Configuration,
            Self::Connectivity(_) => ErrorKind::Connectivity,
            Self::Authentication(_) => ErrorKind::Authentication,
            Self::TokenRefresh(_) => ErrorKind::TokenRefresh,
            Self::Transfer(_) => ErrorKind::Transfer,
            Self::Timeout(_) => ErrorKind::Timeout,
        }
    }

    /// SMTP reply code behind the failure, if the server sent one.
    #[must_use]
    pub const fn reply_code(&self) -> Option<u16> {
        match self {
            Self::Connectivity(e) | Self::Authentication(e) | Self::Transfer(e) => e.reply_code(),
            _ => None,
        }
    }

    /// True for 4xx SMTP replies, which may succeed if retried later.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Connectivity(e) | Self::Authentication(e) | Self::Transfer(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn classifies_smtp_failures() {
        let err = Error::Transfer(courier_smtp::Error::smtp_error(451, "try later"));
        assert_eq!(err.kind(), ErrorKind::Transfer);
        assert_eq!(err.reply_code(), Some(451));
        assert!(err.is_transient());

        let err = Error::Authentication(courier_smtp::Error::smtp_error(535, "bad credentials"));
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert!(!err.is_transient());
    }

    #[test]
    fn local_failures_are_configuration() {
        assert_eq!(Error::UnsupportedAuthentication.kind(), ErrorKind::Configuration);
        let err: Error = CryptoError::Decryption("bad".into()).into();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.reply_code(), None);
    }

    #[test]
    fn token_refresh_keeps_source() {
        let err = Error::TokenRefresh(courier_oauth::Error::NoRefreshToken);
        assert_eq!(err.kind(), ErrorKind::TokenRefresh);
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("No refresh token"));
    }
}
