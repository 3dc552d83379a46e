//! First-time `OAuth2` grant for an account file.

use std::path::Path;

use anyhow::{Context, bail};
use courier_core::EmailAccount;
use courier_oauth::{Endpoints, OAuth2Credential, OAuthClient, TokenState, TokenStore};
use tracing::info;

use crate::store::AccountFileStore;

/// Consent flow bound to one account file.
#[derive(Debug)]
pub struct Grant {
    credential: OAuth2Credential,
    client: OAuthClient,
    key: String,
}

impl Grant {
    /// Resolves the provider of an `OAuth2` account.
    ///
    /// # Errors
    ///
    /// Returns an error if the account does not use `OAuth2` or its
    /// credential is invalid.
    pub fn new(account: &EmailAccount, endpoints: &Endpoints) -> anyhow::Result<Self> {
        let Some(credential) = account.oauth2() else {
            bail!(
                "account {} uses {} authentication, not oauth2",
                account.id,
                account.authentication().kind()
            );
        };
        let provider = credential.provider(endpoints)?;
        Ok(Self {
            credential: credential.clone(),
            client: OAuthClient::new(provider),
            key: account.key(),
        })
    }

    /// The URL to open in a browser. The account key is the `state`.
    #[must_use]
    pub fn consent_url(&self, redirect_uri: &str) -> String {
        self.client
            .authorization_url(&self.credential, redirect_uri, &self.key)
            .into()
    }

    /// Exchanges `code` and writes the granted token into the account file.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider refuses the code or the file cannot
    /// be updated.
    pub async fn complete(
        &self,
        path: &Path,
        code: &str,
        redirect_uri: &str,
    ) -> anyhow::Result<TokenState> {
        let state = self
            .client
            .exchange_code(&self.credential, code.trim(), redirect_uri)
            .await
            .context("exchanging authorization code")?;
        AccountFileStore::new(path)
            .save(&self.key, &state)
            .await
            .map_err(|e| anyhow::anyhow!(e))
            .with_context(|| format!("saving token to {}", path.display()))?;
        info!(account = %self.key, expires_at = %state.expires_at, "oauth2 grant stored");
        Ok(state)
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
    use crate::store::{load_account, write_account};
    use courier_core::{AccountId, EmailAddress, ProjectId};
    use courier_oauth::testing::TokenEndpoint;

    const REDIRECT: &str = "http://localhost:8080/callback";

    fn account() -> EmailAccount {
        let mut account = EmailAccount::new(
            AccountId(9),
            ProjectId(1),
            "Alerts",
            "smtp.office365.com",
            587,
            false,
            EmailAddress::parse("alerts@contoso.com").unwrap(),
        );
        account.set_oauth2(OAuth2Credential::microsoft("cid", "csecret", "contoso"), None);
        account
    }

    fn endpoints(endpoint: &TokenEndpoint) -> Endpoints {
        Endpoints {
            microsoft_token_url: endpoint.url("/{tenant}/token"),
            ..Endpoints::default()
        }
    }

    #[test]
    fn consent_url_carries_account_key() {
        let grant = Grant::new(&account(), &Endpoints::default()).unwrap();
        let url = grant.consent_url(REDIRECT);
        assert!(url.starts_with("https://login.microsoftonline.com/contoso/oauth2/v2.0/authorize?"));
        assert!(url.contains("state=9"));
        assert!(url.contains("access_type=offline"));
    }

    #[test]
    fn login_account_cannot_be_authorized() {
        let mut account = account();
        account.set_login("user", "sealed");
        let err = Grant::new(&account, &Endpoints::default()).unwrap_err();
        assert!(err.to_string().contains("not oauth2"));
    }

    #[tokio::test]
    async fn granted_token_is_written_to_account_file() {
        let endpoint = TokenEndpoint::start(
            200,
            r#"{"access_token":"first","refresh_token":"granted","expires_in":3600}"#,
        )
        .await
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("account.json");
        write_account(&path, &account()).await.unwrap();

        let grant = Grant::new(&account(), &endpoints(&endpoint)).unwrap();
        let state = grant.complete(&path, "the-code\n", REDIRECT).await.unwrap();

        let reloaded = load_account(&path).await.unwrap();
        assert_eq!(reloaded.token_state(), Some(&state));
        assert_eq!(state.refresh_token, "granted");

        let request = &endpoint.requests()[0];
        assert_eq!(request.path, "/contoso/token");
        assert_eq!(request.form("code"), Some("the-code"));
        assert_eq!(request.form("redirect_uri"), Some(REDIRECT));
    }

    #[tokio::test]
    async fn refused_code_leaves_account_untouched() {
        let endpoint = TokenEndpoint::start(400, r#"{"error":"invalid_grant"}"#)
            .await
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("account.json");
        write_account(&path, &account()).await.unwrap();

        let grant = Grant::new(&account(), &endpoints(&endpoint)).unwrap();
        assert!(grant.complete(&path, "stale", REDIRECT).await.is_err());
        assert!(load_account(&path).await.unwrap().token_state().is_none());
    }
}
