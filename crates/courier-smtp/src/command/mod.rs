//! SMTP command serialization.

use crate::types::{Address, AuthMechanism};

/// SMTP command sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// EHLO - Extended greeting
    Ehlo {
        /// Client hostname
        hostname: String,
    },
    /// STARTTLS - Upgrade to TLS
    StartTls,
    /// AUTH - Begin a SASL exchange
    Auth {
        /// Authentication mechanism
        mechanism: AuthMechanism,
        /// Base64 initial response (RFC 4954 §4)
        initial_response: Option<String>,
    },
    /// Base64 answer to a `334` challenge
    AuthResponse(String),
    /// `*` - Cancel the SASL exchange
    AuthCancel,
    /// MAIL FROM - Start mail transaction
    MailFrom {
        /// Sender address
        from: Address,
    },
    /// RCPT TO - Add recipient
    RcptTo {
        /// Recipient address
        to: Address,
    },
    /// DATA - Begin message data
    Data,
    /// RSET - Reset transaction
    Rset,
    /// QUIT - Close connection
    Quit,
}

impl Command {
    /// Serializes the command to bytes, including the trailing CRLF.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut line = match self {
            Self::Ehlo { hostname } => format!("EHLO {hostname}"),
            Self::StartTls => "STARTTLS".to_string(),
            Self::Auth {
                mechanism,
                initial_response,
            } => match initial_response {
                // An empty initial response is sent as "=".
                Some(resp) if resp.is_empty() => format!("AUTH {mechanism} ="),
                Some(resp) => format!("AUTH {mechanism} {resp}"),
                None => format!("AUTH {mechanism}"),
            },
            Self::AuthResponse(resp) => resp.clone(),
            Self::AuthCancel => "*".to_string(),
            Self::MailFrom { from } => format!("MAIL FROM:<{from}>"),
            Self::RcptTo { to } => format!("RCPT TO:<{to}>"),
            Self::Data => "DATA".to_string(),
            Self::Rset => "RSET".to_string(),
            Self::Quit => "QUIT".to_string(),
        }
        .into_bytes();
        line.extend_from_slice(b"\r\n");
        line
    }

    /// Returns the line as it may be logged; AUTH payloads are masked.
    #[must_use]
    pub fn redacted(&self) -> String {
        match self {
            Self::Auth {
                mechanism,
                initial_response: Some(_),
            } => format!("AUTH {mechanism} ****"),
            Self::AuthResponse(_) => "****".to_string(),
            other => String::from_utf8_lossy(&other.serialize())
                .trim_end()
                .to_string(),
        }
    }
}

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
    fn ehlo() {
        let cmd = Command::Ehlo {
            hostname: "client.example.com".to_string(),
        };
        assert_eq!(cmd.serialize(), b"EHLO client.example.com\r\n");
    }

    #[test]
    fn envelope_commands() {
        let from = Command::MailFrom {
            from: Address::new("sender@example.com").unwrap(),
        };
        let to = Command::RcptTo {
            to: Address::new("rcpt@example.org").unwrap(),
        };
        assert_eq!(from.serialize(), b"MAIL FROM:<sender@example.com>\r\n");
        assert_eq!(to.serialize(), b"RCPT TO:<rcpt@example.org>\r\n");
    }

    #[test]
    fn auth_variants() {
        let with_ir = Command::Auth {
            mechanism: AuthMechanism::Plain,
            initial_response: Some("AHVzZXIAcGFzcw==".to_string()),
        };
        assert_eq!(with_ir.serialize(), b"AUTH PLAIN AHVzZXIAcGFzcw==\r\n");

        let without = Command::Auth {
            mechanism: AuthMechanism::Login,
            initial_response: None,
        };
        assert_eq!(without.serialize(), b"AUTH LOGIN\r\n");

        let empty = Command::Auth {
            mechanism: AuthMechanism::Plain,
            initial_response: Some(String::new()),
        };
        assert_eq!(empty.serialize(), b"AUTH PLAIN =\r\n");

        assert_eq!(Command::AuthCancel.serialize(), b"*\r\n");
    }

    #[test]
    fn simple_commands() {
        assert_eq!(Command::StartTls.serialize(), b"STARTTLS\r\n");
        assert_eq!(Command::Data.serialize(), b"DATA\r\n");
        assert_eq!(Command::Rset.serialize(), b"RSET\r\n");
        assert_eq!(Command::Quit.serialize(), b"QUIT\r\n");
    }

    #[test]
    fn redacts_credentials() {
        let cmd = Command::Auth {
            mechanism: AuthMechanism::XOAuth2,
            initial_response: Some("secret".to_string()),
        };
        assert_eq!(cmd.redacted(), "AUTH XOAUTH2 ****");
        assert_eq!(Command::AuthResponse("secret".into()).redacted(), "****");
        assert_eq!(Command::Quit.redacted(), "QUIT");
    }
}
