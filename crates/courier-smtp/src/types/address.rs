//! Envelope addresses.

use crate::error::{Error, Result};

/// Email address used in `MAIL FROM` and `RCPT TO`.
///
/// Only the syntax that could corrupt the command line is checked here;
/// stricter validation belongs to the caller's domain model.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Creates a new address from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is empty, lacks a single `@` with
    /// non-empty local and domain parts, or contains whitespace, control
    /// characters or angle brackets.
    pub fn new(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        Self::validate(&addr)?;
        Ok(Self(addr))
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(addr: &str) -> Result<()> {
        if addr.is_empty() {
            return Err(Error::InvalidAddress("address cannot be empty".into()));
        }
        if addr
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == '<' || c == '>')
        {
            return Err(Error::InvalidAddress(format!(
                "{addr:?} contains forbidden characters"
            )));
        }
        match addr.split_once('@') {
            Some((local, domain))
                if !local.is_empty() && !domain.is_empty() && !domain.contains('@') =>
            {
                Ok(())
            }
            _ => Err(Error::InvalidAddress(format!(
                "{addr:?} must have the form local@domain"
            ))),
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn valid_address() {
        let addr = Address::new("user@example.com").unwrap();
        assert_eq!(addr.as_str(), "user@example.com");
        assert_eq!(addr.to_string(), "user@example.com");
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["", "userexample.com", "@example.com", "user@", "a@b@c"] {
            assert!(Address::new(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn rejects_command_injection() {
        assert!(Address::new("a@x.com>\r\nRCPT TO:<evil@y.com").is_err());
        assert!(Address::new("a b@x.com").is_err());
    }
}
