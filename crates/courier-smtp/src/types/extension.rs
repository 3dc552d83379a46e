//! SMTP service extensions advertised in the EHLO reply.

/// SMTP extension discovered from an EHLO reply line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Extension {
    /// STARTTLS (RFC 3207)
    StartTls,
    /// AUTH with the advertised SASL mechanisms (RFC 4954)
    Auth(Vec<AuthMechanism>),
    /// SIZE with the optional fixed maximum (RFC 1870)
    Size(Option<usize>),
    /// 8BITMIME
    EightBitMime,
    /// PIPELINING
    Pipelining,
    /// SMTPUTF8
    SmtpUtf8,
    /// Any other keyword, kept verbatim.
    Other(String),
}

impl Extension {
    /// Parses one EHLO reply line (without the reply code).
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let mut parts = line.split_whitespace();
        let Some(keyword) = parts.next() else {
            return Self::Other(line.to_string());
        };

        match keyword.to_ascii_uppercase().as_str() {
            "STARTTLS" => Self::StartTls,
            "AUTH" => Self::Auth(parts.filter_map(AuthMechanism::parse).collect()),
            "SIZE" => Self::Size(parts.next().and_then(|s| s.parse().ok())),
            "8BITMIME" => Self::EightBitMime,
            "PIPELINING" => Self::Pipelining,
            "SMTPUTF8" => Self::SmtpUtf8,
            _ => Self::Other(line.to_string()),
        }
    }
}

/// SASL mechanism name as used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMechanism {
    /// PLAIN (RFC 4616)
    Plain,
    /// LOGIN
    Login,
    /// `XOAUTH2` bearer-token mechanism
    XOAuth2,
}

impl AuthMechanism {
    /// Parses a mechanism name, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PLAIN" => Some(Self::Plain),
            "LOGIN" => Some(Self::Login),
            "XOAUTH2" => Some(Self::XOAuth2),
            _ => None,
        }
    }

    /// Returns the mechanism name as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
            Self::XOAuth2 => "XOAUTH2",
        }
    }
}

impl std::fmt::Display for AuthMechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
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
    fn parse_keywords() {
        assert_eq!(Extension::parse("STARTTLS"), Extension::StartTls);
        assert_eq!(Extension::parse("starttls"), Extension::StartTls);
        assert_eq!(Extension::parse("8BITMIME"), Extension::EightBitMime);
        assert_eq!(Extension::parse("PIPELINING"), Extension::Pipelining);
        assert_eq!(Extension::parse("SMTPUTF8"), Extension::SmtpUtf8);
    }

    #[test]
    fn parse_auth_skips_unknown_mechanisms() {
        let ext = Extension::parse("AUTH LOGIN PLAIN CRAM-MD5 XOAUTH2");
        assert_eq!(
            ext,
            Extension::Auth(vec![
                AuthMechanism::Login,
                AuthMechanism::Plain,
                AuthMechanism::XOAuth2
            ])
        );
    }

    #[test]
    fn parse_size() {
        assert_eq!(Extension::parse("SIZE 35882577"), Extension::Size(Some(35_882_577)));
        assert_eq!(Extension::parse("SIZE"), Extension::Size(None));
    }

    #[test]
    fn parse_other() {
        assert_eq!(
            Extension::parse("ENHANCEDSTATUSCODES"),
            Extension::Other("ENHANCEDSTATUSCODES".to_string())
        );
        assert!(matches!(Extension::parse(""), Extension::Other(_)));
    }

    #[test]
    fn mechanism_names() {
        assert_eq!(AuthMechanism::parse("xoauth2"), Some(AuthMechanism::XOAuth2));
        assert_eq!(AuthMechanism::parse("GSSAPI"), None);
        assert_eq!(AuthMechanism::Login.to_string(), "LOGIN");
    }
}
