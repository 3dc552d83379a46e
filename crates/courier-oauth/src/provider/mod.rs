//! `OAuth2` provider configurations.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// Placeholder substituted with the tenant in Microsoft endpoint templates.
pub const TENANT_PLACEHOLDER: &str = "{tenant}";

/// Identity platform behind a [`Provider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Google accounts.
    Gmail,
    /// Microsoft identity platform, scoped to one tenant.
    Microsoft,
}

/// Resolved `OAuth2` provider configuration.
#[derive(Debug, Clone)]
pub struct Provider {
    /// Identity platform.
    pub kind: ProviderKind,
    /// Authorization endpoint URL.
    pub auth_url: Url,
    /// Token endpoint URL.
    pub token_url: Url,
    /// Scopes requested on refresh.
    pub scopes: Vec<String>,
}

impl Provider {
    /// Creates a new provider configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if URLs are invalid.
    pub fn new(
        kind: ProviderKind,
        auth_url: impl AsRef<str>,
        token_url: impl AsRef<str>,
    ) -> Result<Self> {
        Ok(Self {
            kind,
            auth_url: Url::parse(auth_url.as_ref())?,
            token_url: Url::parse(token_url.as_ref())?,
            scopes: Vec::new(),
        })
    }

    /// Sets the scopes.
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Scopes as the space-separated `scope` form value.
    #[must_use]
    pub fn scope(&self) -> String {
        self.scopes.join(" ")
    }

    /// Gmail with the production endpoints.
    ///
    /// Scopes:
    /// - `https://mail.google.com/` - Full Gmail access (IMAP/SMTP)
    ///
    /// # Errors
    ///
    /// Returns an error if URL parsing fails.
    pub fn gmail() -> Result<Self> {
        Endpoints::default().gmail()
    }

    /// Microsoft for `tenant` with the production endpoints.
    ///
    /// Scopes:
    /// - `https://outlook.office365.com/SMTP.Send` - SMTP submission
    /// - `offline_access` - Refresh token
    ///
    /// # Errors
    ///
    /// Returns an error if the tenant is not usable in a URL path.
    pub fn microsoft(tenant: &str) -> Result<Self> {
        Endpoints::default().microsoft(tenant)
    }
}

/// Endpoint URLs for both providers.
///
/// Microsoft URLs are templates containing [`TENANT_PLACEHOLDER`]. Every
/// field can be overridden, which is how tests point refreshes at a local
/// server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    /// Gmail authorization URL.
    pub gmail_auth_url: String,
    /// Gmail token URL.
    pub gmail_token_url: String,
    /// Microsoft authorization URL template.
    pub microsoft_auth_url: String,
    /// Microsoft token URL template.
    pub microsoft_token_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            gmail_auth_url: "https://accounts.google.com/o/oauth2/auth".into(),
            gmail_token_url: "https://oauth2.googleapis.com/token".into(),
            microsoft_auth_url: "https://login.microsoftonline.com/{tenant}/oauth2/v2.0/authorize"
                .into(),
            microsoft_token_url: "https://login.microsoftonline.com/{tenant}/oauth2/v2.0/token"
                .into(),
        }
    }
}

impl Endpoints {
    /// Resolves the Gmail provider.
    ///
    /// # Errors
    ///
    /// Returns an error if a URL is invalid.
    pub fn gmail(&self) -> Result<Provider> {
        Ok(
            Provider::new(ProviderKind::Gmail, &self.gmail_auth_url, &self.gmail_token_url)?
                .with_scopes(vec!["https://mail.google.com/".to_string()]),
        )
    }

    /// Resolves the Microsoft provider for `tenant`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the tenant is empty or contains
    /// characters other than ASCII alphanumerics, `-` and `.`, or an error if
    /// a resolved URL is invalid.
    pub fn microsoft(&self, tenant: &str) -> Result<Provider> {
        if tenant.is_empty()
            || !tenant
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        {
            return Err(Error::InvalidConfig(format!("invalid tenant {tenant:?}")));
        }

        Ok(Provider::new(
            ProviderKind::Microsoft,
            self.microsoft_auth_url.replace(TENANT_PLACEHOLDER, tenant),
            self.microsoft_token_url.replace(TENANT_PLACEHOLDER, tenant),
        )?
        .with_scopes(vec![
            "https://outlook.office365.com/SMTP.Send".to_string(),
            "offline_access".to_string(),
        ]))
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
    fn gmail_provider() {
        let provider = Provider::gmail().unwrap();
        assert_eq!(provider.kind, ProviderKind::Gmail);
        assert_eq!(provider.auth_url.as_str(), "https://accounts.google.com/o/oauth2/auth");
        assert_eq!(provider.token_url.as_str(), "https://oauth2.googleapis.com/token");
        assert_eq!(provider.scope(), "https://mail.google.com/");
    }

    #[test]
    fn microsoft_provider_uses_tenant() {
        let provider = Provider::microsoft("72f988bf-86f1-41af-91ab-2d7cd011db47").unwrap();
        assert_eq!(provider.kind, ProviderKind::Microsoft);
        assert_eq!(
            provider.auth_url.as_str(),
            "https://login.microsoftonline.com/72f988bf-86f1-41af-91ab-2d7cd011db47/oauth2/v2.0/authorize"
        );
        assert_eq!(
            provider.token_url.as_str(),
            "https://login.microsoftonline.com/72f988bf-86f1-41af-91ab-2d7cd011db47/oauth2/v2.0/token"
        );
        assert_eq!(
            provider.scope(),
            "https://outlook.office365.com/SMTP.Send offline_access"
        );
    }

    #[test]
    fn rejects_tenant_path_tricks() {
        assert!(Provider::microsoft("").is_err());
        assert!(Provider::microsoft("evil/../common").is_err());
        assert!(Provider::microsoft("a b").is_err());
    }

    #[test]
    fn overridden_templates() {
        let endpoints = Endpoints {
            microsoft_token_url: "http://127.0.0.1:9/{tenant}/token".into(),
            ..Endpoints::default()
        };
        let provider = endpoints.microsoft("contoso.com").unwrap();
        assert_eq!(provider.token_url.as_str(), "http://127.0.0.1:9/contoso.com/token");
    }

    #[test]
    fn invalid_override_is_reported() {
        let endpoints = Endpoints {
            gmail_token_url: "not a url".into(),
            ..Endpoints::default()
        };
        assert!(matches!(endpoints.gmail(), Err(Error::UrlError(_))));
    }
}
