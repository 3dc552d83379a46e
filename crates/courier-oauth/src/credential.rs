//! OAuth2 client credentials.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::provider::{Endpoints, Provider};

/// Client registration used to refresh tokens.
///
/// A `tenant_id` selects the Microsoft identity platform for that tenant;
/// without one the credential belongs to Gmail.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuth2Credential {
    /// Client (application) ID.
    pub client_id: String,
    /// Client secret.
    pub client_secret: String,
    /// Microsoft tenant (GUID or domain).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

impl OAuth2Credential {
    /// Creates a Gmail credential.
    #[must_use]
    pub fn gmail(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            tenant_id: None,
        }
    }

    /// Creates a Microsoft credential for `tenant_id`.
    #[must_use]
    pub fn microsoft(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            tenant_id: Some(tenant_id.into()),
        }
    }

    /// Checks the required fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the client ID or secret is blank,
    /// or a tenant is given but blank.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::InvalidConfig("client_id is empty".into()));
        }
        if self.client_secret.trim().is_empty() {
            return Err(Error::InvalidConfig("client_secret is empty".into()));
        }
        if self.tenant_id.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(Error::InvalidConfig("tenant_id is empty".into()));
        }
        Ok(())
    }

    /// Resolves the provider this credential refreshes against.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential is invalid or the endpoint
    /// templates do not produce valid URLs.
    pub fn provider(&self, endpoints: &Endpoints) -> Result<Provider> {
        self.validate()?;
        match self.tenant_id.as_deref() {
            Some(tenant) => endpoints.microsoft(tenant.trim()),
            None => endpoints.gmail(),
        }
    }
}

impl fmt::Debug for OAuth2Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth2Credential")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("tenant_id", &self.tenant_id)
            .finish()
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
    use crate::provider::ProviderKind;

    #[test]
    fn validate_fields() {
        assert!(OAuth2Credential::gmail("id", "secret").validate().is_ok());
        assert!(OAuth2Credential::gmail("", "secret").validate().is_err());
        assert!(OAuth2Credential::gmail("id", " ").validate().is_err());
        assert!(OAuth2Credential::microsoft("id", "secret", "").validate().is_err());
        assert!(
            OAuth2Credential::microsoft("id", "secret", "contoso.onmicrosoft.com")
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn tenant_selects_provider() {
        let endpoints = Endpoints::default();

        let gmail = OAuth2Credential::gmail("id", "secret").provider(&endpoints).unwrap();
        assert_eq!(gmail.kind, ProviderKind::Gmail);

        let microsoft = OAuth2Credential::microsoft("id", "secret", "contoso")
            .provider(&endpoints)
            .unwrap();
        assert_eq!(microsoft.kind, ProviderKind::Microsoft);
        assert_eq!(
            microsoft.token_url.as_str(),
            "https://login.microsoftonline.com/contoso/oauth2/v2.0/token"
        );
    }

    #[test]
    fn invalid_credential_has_no_provider() {
        let err = OAuth2Credential::gmail("", "secret")
            .provider(&Endpoints::default())
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn serde_omits_missing_tenant() {
        let json = serde_json::to_string(&OAuth2Credential::gmail("id", "secret")).unwrap();
        assert_eq!(json, r#"{"client_id":"id","client_secret":"secret"}"#);

        let parsed: OAuth2Credential =
            serde_json::from_str(r#"{"client_id":"a","client_secret":"b","tenant_id":"t"}"#).unwrap();
        assert_eq!(parsed.tenant_id.as_deref(), Some("t"));
    }

    #[test]
    fn debug_hides_secret() {
        let rendered = format!("{:?}", OAuth2Credential::gmail("id", "hush"));
        assert!(!rendered.contains("hush"));
    }
}
