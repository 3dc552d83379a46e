//! Account model types.

use std::fmt;

use chrono::{DateTime, Utc};
use courier_oauth::{OAuth2Credential, TokenState};
use courier_smtp::Security;
use serde::{Deserialize, Serialize};

use super::validation::{EmailAddress, ValidationError};

/// Unique identifier for an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub i64);

impl AccountId {
    /// Create a new account ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the project an account belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub i64);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Username and encrypted password.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginCredential {
    /// SMTP username.
    pub username: String,
    /// Password ciphertext from [`Cipher::encrypt`](crate::Cipher::encrypt).
    pub password: String,
}

impl fmt::Debug for LoginCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// How an account authenticates. Exactly one variant is active.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Authentication {
    /// Nothing configured yet; sending fails before dialing.
    #[default]
    Unset,
    /// SASL PLAIN or LOGIN with a stored password.
    Login(LoginCredential),
    /// `XOAUTH2` with tokens from the account's provider.
    #[serde(rename = "oauth2")]
    OAuth2 {
        /// Client registration.
        credential: OAuth2Credential,
        /// Cached tokens, absent until the first grant is stored.
        #[serde(default)]
        token: Option<TokenState>,
    },
}

impl Authentication {
    /// Short name of the variant.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::Login(_) => "login",
            Self::OAuth2 { .. } => "oauth2",
        }
    }
}

/// A sending account: server, sender identity, and credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAccount {
    /// Unique identifier.
    pub id: AccountId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Display name for the account.
    pub name: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// SMTP server hostname.
    pub host: String,
    /// SMTP server port.
    pub port: u16,
    /// Implicit TLS; otherwise STARTTLS is used when offered.
    pub use_tls: bool,
    /// Envelope sender and `XOAUTH2` user.
    pub sender: EmailAddress,
    #[serde(default)]
    authentication: Authentication,
}

impl EmailAccount {
    /// Creates an account with no authentication configured.
    #[must_use]
    pub fn new(
        id: AccountId,
        project_id: ProjectId,
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        use_tls: bool,
        sender: EmailAddress,
    ) -> Self {
        Self {
            id,
            project_id,
            name: name.into(),
            created_at: Utc::now(),
            host: host.into(),
            port,
            use_tls,
            sender,
            authentication: Authentication::Unset,
        }
    }

    /// Switches to password authentication, dropping any OAuth2 state.
    pub fn set_login(&mut self, username: impl Into<String>, encrypted_password: impl Into<String>) {
        self.authentication = Authentication::Login(LoginCredential {
            username: username.into(),
            password: encrypted_password.into(),
        });
    }

    /// Switches to OAuth2, dropping any stored password.
    pub fn set_oauth2(&mut self, credential: OAuth2Credential, token: Option<TokenState>) {
        self.authentication = Authentication::OAuth2 { credential, token };
    }

    /// Removes all credentials.
    pub fn clear_authentication(&mut self) {
        self.authentication = Authentication::Unset;
    }

    /// Replaces the cached OAuth2 tokens.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NotOAuth2`] unless the account uses OAuth2.
    pub fn set_token_state(&mut self, state: TokenState) -> Result<(), ValidationError> {
        match &mut self.authentication {
            Authentication::OAuth2 { token, .. } => {
                *token = Some(state);
                Ok(())
            }
            _ => Err(ValidationError::NotOAuth2),
        }
    }

    /// Active credential variant.
    #[must_use]
    pub const fn authentication(&self) -> &Authentication {
        &self.authentication
    }

    /// Password credential, if that variant is active.
    #[must_use]
    pub const fn login(&self) -> Option<&LoginCredential> {
        match &self.authentication {
            Authentication::Login(login) => Some(login),
            _ => None,
        }
    }

    /// OAuth2 client credential, if that variant is active.
    #[must_use]
    pub const fn oauth2(&self) -> Option<&OAuth2Credential> {
        match &self.authentication {
            Authentication::OAuth2 { credential, .. } => Some(credential),
            _ => None,
        }
    }

    /// Cached OAuth2 tokens, if any.
    #[must_use]
    pub const fn token_state(&self) -> Option<&TokenState> {
        match &self.authentication {
            Authentication::OAuth2 { token, .. } => token.as_ref(),
            _ => None,
        }
    }

    /// Transport security implied by `use_tls`.
    #[must_use]
    pub const fn security(&self) -> Security {
        if self.use_tls {
            Security::Implicit
        } else {
            Security::Opportunistic
        }
    }

    /// Key identifying the account to the token store.
    #[must_use]
    pub fn key(&self) -> String {
        self.id.to_string()
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

    fn account() -> EmailAccount {
        EmailAccount::new(
            AccountId::new(7),
            ProjectId(3),
            "Billing",
            "smtp.example.com",
            465,
            true,
            EmailAddress::parse("billing@example.com").unwrap(),
        )
    }

    fn token() -> TokenState {
        TokenState::new("access", "refresh", Utc::now())
    }

    #[test]
    fn new_account_is_unset() {
        let account = account();
        assert_eq!(account.authentication(), &Authentication::Unset);
        assert!(account.login().is_none());
        assert!(account.oauth2().is_none());
        assert_eq!(account.security(), Security::Implicit);
        assert_eq!(account.key(), "7");
    }

    #[test]
    fn oauth2_replaces_login() {
        let mut account = account();
        account.set_login("billing", "ciphertext");
        assert_eq!(account.login().unwrap().username, "billing");

        account.set_oauth2(OAuth2Credential::gmail("id", "secret"), Some(token()));
        assert!(account.login().is_none());
        assert!(account.oauth2().is_some());
        assert!(account.token_state().is_some());
    }

    #[test]
    fn login_replaces_oauth2_and_its_tokens() {
        let mut account = account();
        account.set_oauth2(OAuth2Credential::gmail("id", "secret"), Some(token()));
        account.set_login("billing", "ciphertext");

        assert!(account.oauth2().is_none());
        assert!(account.token_state().is_none());
        assert_eq!(account.authentication().kind(), "login");
    }

    #[test]
    fn token_state_requires_oauth2() {
        let mut account = account();
        account.set_login("billing", "ciphertext");
        assert_eq!(account.set_token_state(token()), Err(ValidationError::NotOAuth2));

        account.set_oauth2(OAuth2Credential::gmail("id", "secret"), None);
        assert!(account.token_state().is_none());
        account.set_token_state(token()).unwrap();
        assert_eq!(account.token_state().unwrap().access_token, "access");

        account.clear_authentication();
        assert!(account.token_state().is_none());
    }

    #[test]
    fn starttls_when_not_implicit() {
        let mut account = account();
        account.use_tls = false;
        assert_eq!(account.security(), Security::Opportunistic);
    }

    #[test]
    fn serde_round_trip() {
        let mut account = account();
        account.set_oauth2(
            OAuth2Credential::microsoft("id", "secret", "contoso"),
            Some(token()),
        );
        let json = serde_json::to_value(&account).unwrap();
        assert_eq!(json["authentication"]["kind"], "oauth2");
        assert_eq!(json["sender"], "billing@example.com");

        let back: EmailAccount = serde_json::from_value(json).unwrap();
        assert_eq!(back, account);
    }

    #[test]
    fn login_json_shape() {
        let json = r#"{
            "id": 1, "project_id": 2, "name": "n",
            "created_at": "2026-01-01T00:00:00Z",
            "host": "smtp.example.com", "port": 587, "use_tls": false,
            "sender": "a@example.com",
            "authentication": {"kind": "login", "username": "a", "password": "c2VjcmV0"}
        }"#;
        let account: EmailAccount = serde_json::from_str(json).unwrap();
        assert_eq!(account.login().unwrap().password, "c2VjcmV0");
        assert!(!format!("{account:?}").contains("c2VjcmV0"));
    }

    #[test]
    fn missing_authentication_is_unset() {
        let json = r#"{
            "id": 1, "project_id": 2, "name": "n",
            "created_at": "2026-01-01T00:00:00Z",
            "host": "h", "port": 25, "use_tls": false,
            "sender": "a@example.com"
        }"#;
        let account: EmailAccount = serde_json::from_str(json).unwrap();
        assert_eq!(account.authentication(), &Authentication::Unset);
    }
}
