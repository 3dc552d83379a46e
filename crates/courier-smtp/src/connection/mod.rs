//! SMTP connection management.

mod session;
mod stream;

pub use session::{Security, Session, SessionState};
pub use stream::{SmtpStream, connect, connect_tls, default_tls_config, tls_config};

use crate::types::{AuthMechanism, Extension};
use std::collections::HashSet;

/// Server capabilities from the greeting and EHLO reply.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Server hostname from greeting.
    pub hostname: String,
    /// Supported extensions.
    pub extensions: HashSet<Extension>,
}

impl ServerInfo {
    /// Checks if the server supports an extension.
    #[must_use]
    pub fn supports(&self, ext: &Extension) -> bool {
        self.extensions.contains(ext)
    }

    /// Checks if STARTTLS is supported.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports(&Extension::StartTls)
    }

    /// Returns the maximum message size, if advertised.
    #[must_use]
    pub fn max_message_size(&self) -> Option<usize> {
        self.extensions.iter().find_map(|ext| match ext {
            Extension::Size(size) => *size,
            _ => None,
        })
    }

    /// Returns supported authentication mechanisms.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<AuthMechanism> {
        self.extensions
            .iter()
            .find_map(|ext| match ext {
                Extension::Auth(mechanisms) => Some(mechanisms.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// Checks if a SASL mechanism is advertised.
    #[must_use]
    pub fn supports_auth(&self, mechanism: AuthMechanism) -> bool {
        self.auth_mechanisms().contains(&mechanism)
    }

    pub(crate) fn parse_extensions<'a>(lines: impl IntoIterator<Item = &'a String>) -> HashSet<Extension> {
        // The first line is the server's greeting, not an extension.
        lines
            .into_iter()
            .skip(1)
            .map(|line| Extension::parse(line))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_parse_extensions() {
        let lines: Vec<String> = ["mx.example.com", "STARTTLS", "AUTH LOGIN XOAUTH2", "SIZE 1024"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let info = ServerInfo {
            hostname: "mx.example.com".into(),
            extensions: ServerInfo::parse_extensions(&lines),
        };

        assert!(info.supports_starttls());
        assert!(info.supports_auth(AuthMechanism::XOAuth2));
        assert!(!info.supports_auth(AuthMechanism::Plain));
        assert_eq!(info.max_message_size(), Some(1024));
        assert!(!info.supports(&Extension::Other("mx.example.com".into())));
    }
}
