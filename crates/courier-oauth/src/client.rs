//! Token endpoint client.

use chrono::Utc;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::credential::OAuth2Credential;
use crate::error::{Error, Result};
use crate::provider::Provider;
use crate::token::{ErrorResponse, TokenResponse, TokenState};

/// Talks to one provider's token endpoint.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    /// Provider configuration.
    pub provider: Provider,
    http_client: Client,
}

impl OAuthClient {
    /// Creates a client with its own HTTP connection pool.
    #[must_use]
    pub fn new(provider: Provider) -> Self {
        Self::with_http_client(provider, Client::new())
    }

    /// Creates a client sharing an existing HTTP connection pool.
    #[must_use]
    pub const fn with_http_client(provider: Provider, http_client: Client) -> Self {
        Self {
            provider,
            http_client,
        }
    }

    /// Builds the consent URL the account owner opens in a browser.
    ///
    /// Requests offline access and forces the consent prompt so the
    /// provider issues a refresh token even for a returning user. `state`
    /// comes back unchanged on the redirect.
    #[must_use]
    pub fn authorization_url(
        &self,
        credential: &OAuth2Credential,
        redirect_uri: &str,
        state: &str,
    ) -> Url {
        let mut url = self.provider.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &credential.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.provider.scope())
            .append_pair("state", state)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");
        url
    }

    /// Exchanges an authorization `code` from the consent redirect for the
    /// first token state of an account.
    ///
    /// `redirect_uri` must be the one the consent URL was built with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRefreshToken`] if the provider grants no refresh
    /// token, [`Error::OAuth`] if it refuses the code, or an HTTP/JSON error.
    pub async fn exchange_code(
        &self,
        credential: &OAuth2Credential,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenState> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", credential.client_id.as_str()),
            ("client_secret", credential.client_secret.as_str()),
        ];

        debug!(endpoint = %self.provider.token_url, "exchanging authorization code");
        let state = self.request_token(&params, "").await?;
        if state.refresh_token.is_empty() {
            return Err(Error::NoRefreshToken);
        }
        Ok(state)
    }

    /// Exchanges `refresh_token` for a new access token.
    ///
    /// The returned state keeps `refresh_token` unless the server rotated it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRefreshToken`] if `refresh_token` is empty,
    /// [`Error::OAuth`] if the server refuses the grant, or an HTTP/JSON error.
    pub async fn refresh(
        &self,
        credential: &OAuth2Credential,
        refresh_token: &str,
    ) -> Result<TokenState> {
        if refresh_token.is_empty() {
            return Err(Error::NoRefreshToken);
        }

        let scope = self.provider.scope();
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", credential.client_id.as_str()),
            ("client_secret", credential.client_secret.as_str()),
            ("scope", scope.as_str()),
        ];

        debug!(endpoint = %self.provider.token_url, "refreshing access token");
        self.request_token(&params, refresh_token).await
    }

    async fn request_token(
        &self,
        params: &[(&str, &str)],
        previous_refresh_token: &str,
    ) -> Result<TokenState> {
        let response = self
            .http_client
            .post(self.provider.token_url.clone())
            .form(params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            // Providers answer with an RFC 6749 §5.2 document; anything else
            // is reported with the HTTP status.
            return Err(serde_json::from_str::<ErrorResponse>(&body).map_or_else(
                |_| Error::oauth_error(status.as_str(), body.trim()),
                ErrorResponse::into_error,
            ));
        }

        let token_response: TokenResponse = serde_json::from_str(&body)?;
        TokenState::from_response(token_response, previous_refresh_token, Utc::now())
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
    use crate::provider::Endpoints;
    use crate::testing::TokenEndpoint;

    fn client_for(endpoint: &TokenEndpoint) -> OAuthClient {
        let endpoints = Endpoints {
            gmail_token_url: endpoint.url("/token"),
            ..Endpoints::default()
        };
        OAuthClient::new(endpoints.gmail().unwrap())
    }

    fn query(url: &Url) -> Vec<(String, String)> {
        url.query_pairs().into_owned().collect()
    }

    #[test]
    fn gmail_authorization_url() {
        let client = OAuthClient::new(Endpoints::default().gmail().unwrap());
        let url = client.authorization_url(
            &OAuth2Credential::gmail("cid", "csecret"),
            "http://localhost:8080/callback",
            "acct-7",
        );

        assert_eq!(url.host_str(), Some("accounts.google.com"));
        assert_eq!(
            query(&url),
            [
                ("client_id", "cid"),
                ("redirect_uri", "http://localhost:8080/callback"),
                ("response_type", "code"),
                ("scope", "https://mail.google.com/"),
                ("state", "acct-7"),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ]
            .map(|(k, v)| (k.to_string(), v.to_string()))
        );
        assert!(!url.as_str().contains("csecret"));
    }

    #[test]
    fn microsoft_authorization_url_uses_tenant() {
        let credential = OAuth2Credential::microsoft("cid", "csecret", "contoso");
        let client = OAuthClient::new(credential.provider(&Endpoints::default()).unwrap());
        let url = client.authorization_url(&credential, "http://localhost/cb", "s");

        assert_eq!(url.path(), "/contoso/oauth2/v2.0/authorize");
        assert!(
            url.as_str()
                .contains("scope=https%3A%2F%2Foutlook.office365.com%2FSMTP.Send+offline_access")
        );
    }

    #[tokio::test]
    async fn exchanges_authorization_code() {
        let endpoint = TokenEndpoint::start(
            200,
            r#"{"access_token":"first","refresh_token":"granted","expires_in":3600}"#,
        )
        .await
        .unwrap();

        let state = client_for(&endpoint)
            .exchange_code(&OAuth2Credential::gmail("cid", "csecret"), "the-code", "http://localhost/cb")
            .await
            .unwrap();
        assert_eq!(state.access_token, "first");
        assert_eq!(state.refresh_token, "granted");

        let request = &endpoint.requests()[0];
        assert_eq!(request.form("grant_type"), Some("authorization_code"));
        assert_eq!(request.form("code"), Some("the-code"));
        assert_eq!(request.form("redirect_uri"), Some("http://localhost/cb"));
        assert_eq!(request.form("client_id"), Some("cid"));
        assert_eq!(request.form("client_secret"), Some("csecret"));
    }

    #[tokio::test]
    async fn code_grant_without_refresh_token_is_rejected() {
        let endpoint = TokenEndpoint::start(200, r#"{"access_token":"first","expires_in":3600}"#)
            .await
            .unwrap();

        let err = client_for(&endpoint)
            .exchange_code(&OAuth2Credential::gmail("cid", "csecret"), "c", "http://localhost/cb")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoRefreshToken));
    }

    #[tokio::test]
    async fn refused_code_maps_oauth_error() {
        let endpoint = TokenEndpoint::start(400, r#"{"error":"invalid_grant"}"#)
            .await
            .unwrap();

        let err = client_for(&endpoint)
            .exchange_code(&OAuth2Credential::gmail("cid", "csecret"), "used", "http://localhost/cb")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::OAuth { ref error, .. } if error == "invalid_grant"));
    }

    #[tokio::test]
    async fn posts_refresh_grant() {
        let endpoint = TokenEndpoint::start(
            200,
            r#"{"access_token":"fresh","token_type":"Bearer","expires_in":3599}"#,
        )
        .await
        .unwrap();

        let before = Utc::now();
        let state = client_for(&endpoint)
            .refresh(&OAuth2Credential::gmail("cid", "csecret"), "rtoken")
            .await
            .unwrap();

        assert_eq!(state.access_token, "fresh");
        assert_eq!(state.refresh_token, "rtoken");
        assert!(state.expires_at > before);

        let requests = endpoint.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.path, "/token");
        assert_eq!(request.form("grant_type"), Some("refresh_token"));
        assert_eq!(request.form("refresh_token"), Some("rtoken"));
        assert_eq!(request.form("client_id"), Some("cid"));
        assert_eq!(request.form("client_secret"), Some("csecret"));
        assert_eq!(request.form("scope"), Some("https://mail.google.com/"));
    }

    #[tokio::test]
    async fn maps_oauth_error() {
        let endpoint = TokenEndpoint::start(
            400,
            r#"{"error":"invalid_grant","error_description":"Bad Request"}"#,
        )
        .await
        .unwrap();

        let err = client_for(&endpoint)
            .refresh(&OAuth2Credential::gmail("cid", "csecret"), "revoked")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::OAuth { ref error, .. } if error == "invalid_grant"));
    }

    #[tokio::test]
    async fn non_json_error_keeps_status() {
        let endpoint = TokenEndpoint::start(502, "upstream down").await.unwrap();

        let err = client_for(&endpoint)
            .refresh(&OAuth2Credential::gmail("cid", "csecret"), "r")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::OAuth { ref error, ref description } if error == "502" && description == "upstream down"
        ));
    }

    #[tokio::test]
    async fn empty_refresh_token_skips_request() {
        let endpoint = TokenEndpoint::start(200, "{}").await.unwrap();

        let err = client_for(&endpoint)
            .refresh(&OAuth2Credential::gmail("cid", "csecret"), "")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoRefreshToken));
        assert_eq!(endpoint.hits(), 0);
    }
}
