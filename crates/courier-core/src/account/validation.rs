//! Account validation.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::model::{Authentication, EmailAccount};

#[allow(clippy::unwrap_used)]
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)+$").unwrap()
});

/// A syntactically valid `local@domain` address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Parses and validates an address. Surrounding whitespace is trimmed.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidEmail`] if the address does not
    /// match `local@domain.tld`.
    pub fn parse(address: &str) -> Result<Self, ValidationError> {
        let address = address.trim();
        if EMAIL_REGEX.is_match(address) {
            Ok(Self(address.to_string()))
        } else {
            Err(ValidationError::InvalidEmail)
        }
    }

    /// The address text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for EmailAddress {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EmailAddress> for String {
    fn from(address: EmailAddress) -> Self {
        address.0
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validation error for account configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// Account name is empty.
    EmptyName,
    /// Sender address format is invalid.
    InvalidEmail,
    /// SMTP host is empty.
    EmptyHost,
    /// SMTP port is zero.
    InvalidPort,
    /// Login username is empty.
    EmptyUsername,
    /// Login password is empty.
    EmptyPassword,
    /// `OAuth2` client ID is empty.
    EmptyClientId,
    /// `OAuth2` client secret is empty.
    EmptyClientSecret,
    /// `OAuth2` tenant is present but empty.
    EmptyTenant,
    /// Operation needs an `OAuth2` account.
    NotOAuth2,
}

impl ValidationError {
    /// Get human-readable error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::EmptyName => "Account name is required",
            Self::InvalidEmail => "Invalid email address format",
            Self::EmptyHost => "SMTP server is required",
            Self::InvalidPort => "SMTP port must be 1-65535",
            Self::EmptyUsername => "SMTP username is required",
            Self::EmptyPassword => "SMTP password is required",
            Self::EmptyClientId => "OAuth2 client ID is required",
            Self::EmptyClientSecret => "OAuth2 client secret is required",
            Self::EmptyTenant => "OAuth2 tenant must not be empty",
            Self::NotOAuth2 => "Account does not use OAuth2",
        }
    }

    /// Get the field name this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::EmptyName => "name",
            Self::InvalidEmail => "sender",
            Self::EmptyHost => "host",
            Self::InvalidPort => "port",
            Self::EmptyUsername => "username",
            Self::EmptyPassword => "password",
            Self::EmptyClientId => "client_id",
            Self::EmptyClientSecret => "client_secret",
            Self::EmptyTenant => "tenant_id",
            Self::NotOAuth2 => "authentication",
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ValidationError {}

/// Result of validating an account.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// Validate an account configuration.
///
/// Returns `Ok(())` if valid, or `Err(Vec<ValidationError>)` with all errors.
/// An account without authentication passes; sending rejects it separately.
///
/// # Errors
///
/// Returns a vector of `ValidationError` if any fields are invalid.
pub fn validate_account(account: &EmailAccount) -> ValidationResult {
    let mut errors = Vec::new();

    if account.name.trim().is_empty() {
        errors.push(ValidationError::EmptyName);
    }
    if account.host.trim().is_empty() {
        errors.push(ValidationError::EmptyHost);
    }
    if account.port == 0 {
        errors.push(ValidationError::InvalidPort);
    }

    match account.authentication() {
        Authentication::Unset => {}
        Authentication::Login(login) => {
            if login.username.trim().is_empty() {
                errors.push(ValidationError::EmptyUsername);
            }
            if login.password.is_empty() {
                errors.push(ValidationError::EmptyPassword);
            }
        }
        Authentication::OAuth2 { credential, .. } => {
            if credential.client_id.trim().is_empty() {
                errors.push(ValidationError::EmptyClientId);
            }
            if credential.client_secret.trim().is_empty() {
                errors.push(ValidationError::EmptyClientSecret);
            }
            if credential
                .tenant_id
                .as_deref()
                .is_some_and(|tenant| tenant.trim().is_empty())
            {
                errors.push(ValidationError::EmptyTenant);
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
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
    use crate::account::{AccountId, ProjectId};
    use courier_oauth::OAuth2Credential;

    fn account() -> EmailAccount {
        EmailAccount::new(
            AccountId(1),
            ProjectId(1),
            "Alerts",
            "smtp.example.com",
            587,
            false,
            EmailAddress::parse("alerts@example.com").unwrap(),
        )
    }

    #[test]
    fn test_valid_email() {
        assert!(EmailAddress::parse("user@example.com").is_ok());
        assert!(EmailAddress::parse("user.name+tag@example.com").is_ok());
        assert!(EmailAddress::parse("user@sub.example.co.uk").is_ok());
        assert_eq!(EmailAddress::parse("  a@b.io ").unwrap().as_str(), "a@b.io");
    }

    #[test]
    fn test_invalid_email() {
        for bad in [
            "",
            "user",
            "@example.com",
            "user@",
            "user@example",
            "user@@example.com",
            "us er@example.com",
            "user@-example.com",
            "user@example..com",
        ] {
            assert_eq!(EmailAddress::parse(bad), Err(ValidationError::InvalidEmail), "{bad}");
        }
    }

    #[test]
    fn test_deserialize_rejects_invalid_address() {
        assert!(serde_json::from_str::<EmailAddress>("\"nope\"").is_err());
        let ok: EmailAddress = serde_json::from_str("\"a@example.com\"").unwrap();
        assert_eq!(ok.to_string(), "a@example.com");
    }

    #[test]
    fn test_validate_unset_account() {
        assert!(validate_account(&account()).is_ok());
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut account = account();
        account.name = "  ".into();
        account.host = String::new();
        account.port = 0;
        account.set_login("", "");

        let errors = validate_account(&account).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::EmptyName,
                ValidationError::EmptyHost,
                ValidationError::InvalidPort,
                ValidationError::EmptyUsername,
                ValidationError::EmptyPassword,
            ]
        );
    }

    #[test]
    fn test_validate_oauth2_fields() {
        let mut account = account();
        account.set_oauth2(OAuth2Credential::microsoft("", "secret", " "), None);

        let errors = validate_account(&account).unwrap_err();
        assert_eq!(errors, vec![ValidationError::EmptyClientId, ValidationError::EmptyTenant]);
    }

    #[test]
    fn test_error_fields() {
        assert_eq!(ValidationError::InvalidEmail.field(), "sender");
        assert_eq!(ValidationError::EmptyTenant.to_string(), "OAuth2 tenant must not be empty");
    }
}
