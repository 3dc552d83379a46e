//! Access-token lifecycle with single-flight refresh.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{Duration, Utc};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

use crate::client::OAuthClient;
use crate::credential::OAuth2Credential;
use crate::error::{Error, Result, StoreError};
use crate::provider::Endpoints;
use crate::token::TokenState;

/// Persists refreshed tokens.
///
/// Called after every successful refresh and before the new token is used,
/// so a token the provider has already issued is never lost.
pub trait TokenStore: Send + Sync {
    /// Saves `token` as the current state of `account`.
    fn save(
        &self,
        account: &str,
        token: &TokenState,
    ) -> impl Future<Output = std::result::Result<(), StoreError>> + Send;
}

impl<T: TokenStore> TokenStore for Arc<T> {
    fn save(
        &self,
        account: &str,
        token: &TokenState,
    ) -> impl Future<Output = std::result::Result<(), StoreError>> + Send {
        (**self).save(account, token)
    }
}

/// A usable access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreshToken {
    /// Token material to authenticate with.
    pub state: TokenState,
    /// True if this call exchanged the refresh token.
    pub refreshed: bool,
}

/// A state refreshed in this process, with every refresh token exchanged
/// on the way to it.
#[derive(Debug)]
struct Refreshed {
    lineage: Vec<String>,
    state: TokenState,
}

impl Refreshed {
    /// True if the caller's refresh token is in this entry's lineage or is
    /// the one it rotated into. A caller holding any other refresh token was
    /// re-authorized since, and the entry no longer applies.
    fn descends_from(&self, current: Option<&TokenState>) -> bool {
        current.is_none_or(|c| {
            c.refresh_token.is_empty()
                || c.refresh_token == self.state.refresh_token
                || self.lineage.contains(&c.refresh_token)
        })
    }
}

type Slot = Arc<AsyncMutex<Option<Refreshed>>>;

/// Hands out fresh access tokens, refreshing expired ones.
///
/// Refreshes are single-flight per account: concurrent callers for the same
/// account queue on one async lock, and whoever comes second finds the token
/// the first one stored in the slot instead of refreshing again.
#[derive(Debug)]
pub struct TokenManager<S> {
    store: S,
    endpoints: Endpoints,
    skew: Duration,
    http_client: reqwest::Client,
    slots: Mutex<HashMap<String, Slot>>,
}

impl<S: TokenStore> TokenManager<S> {
    /// Creates a manager persisting through `store`, using the production
    /// endpoints and no expiry skew.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self {
            store,
            endpoints: Endpoints::default(),
            skew: Duration::zero(),
            http_client: reqwest::Client::new(),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Overrides the provider endpoints.
    #[must_use]
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Treats tokens expiring within `skew` as already expired.
    #[must_use]
    pub const fn with_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }

    /// The store refreshed tokens are saved to.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Returns a token for `account` that is fresh right now.
    ///
    /// `current` is the caller's cached state. It is returned unchanged while
    /// fresh; otherwise its refresh token is exchanged at the credential's
    /// provider, the result saved through the [`TokenStore`], and then
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for an invalid credential,
    /// [`Error::NoRefreshToken`] when there is nothing to refresh with,
    /// [`Error::Persist`] if the store fails, or the refresh error.
    pub async fn access_token(
        &self,
        account: &str,
        credential: &OAuth2Credential,
        current: Option<&TokenState>,
    ) -> Result<FreshToken> {
        let provider = credential.provider(&self.endpoints)?;

        if let Some(state) = current.filter(|s| s.is_fresh(Utc::now(), self.skew)) {
            return Ok(FreshToken {
                state: state.clone(),
                refreshed: false,
            });
        }

        let slot = self.slot(account);
        let mut cached = slot.lock().await;
        let applicable = cached.as_ref().filter(|r| r.descends_from(current));

        if let Some(entry) = applicable.filter(|r| r.state.is_fresh(Utc::now(), self.skew)) {
            debug!(account, "reusing token refreshed by a concurrent send");
            return Ok(FreshToken {
                state: entry.state.clone(),
                refreshed: false,
            });
        }

        // A token refreshed earlier in this process may carry a rotated
        // refresh token the caller has not seen yet.
        let refresh_token = applicable
            .map(|r| &r.state)
            .or(current)
            .map(|s| s.refresh_token.as_str())
            .filter(|t| !t.is_empty())
            .ok_or(Error::NoRefreshToken)?
            .to_string();
        let mut lineage = applicable.map(|r| r.lineage.clone()).unwrap_or_default();
        if !lineage.contains(&refresh_token) {
            lineage.push(refresh_token.clone());
        }

        let client = OAuthClient::with_http_client(provider, self.http_client.clone());
        let state = client.refresh(credential, &refresh_token).await?;

        self.store
            .save(account, &state)
            .await
            .map_err(Error::Persist)?;
        info!(account, expires_at = %state.expires_at, "access token refreshed");

        *cached = Some(Refreshed {
            lineage,
            state: state.clone(),
        });
        Ok(FreshToken {
            state,
            refreshed: true,
        })
    }

    fn slot(&self, account: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(account.to_string()).or_default())
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
    use crate::testing::TokenEndpoint;
    use tokio_test::{assert_err, assert_ok};

    #[derive(Debug, Default)]
    struct MemoryStore {
        saved: Mutex<Vec<(String, TokenState)>>,
    }

    impl MemoryStore {
        fn saved(&self) -> Vec<(String, TokenState)> {
            self.saved.lock().unwrap().clone()
        }
    }

    impl TokenStore for MemoryStore {
        async fn save(
            &self,
            account: &str,
            token: &TokenState,
        ) -> std::result::Result<(), StoreError> {
            self.saved
                .lock()
                .unwrap()
                .push((account.to_string(), token.clone()));
            Ok(())
        }
    }

    struct FailingStore;

    impl TokenStore for FailingStore {
        async fn save(&self, _: &str, _: &TokenState) -> std::result::Result<(), StoreError> {
            Err("disk full".into())
        }
    }

    const REFRESHED: &str = r#"{"access_token":"new-access","expires_in":3600}"#;

    fn expired() -> TokenState {
        TokenState::new("old-access", "the-refresh", Utc::now() - Duration::minutes(5))
    }

    fn valid() -> TokenState {
        TokenState::new("live-access", "the-refresh", Utc::now() + Duration::hours(1))
    }

    fn endpoints(endpoint: &TokenEndpoint) -> Endpoints {
        Endpoints {
            gmail_token_url: endpoint.url("/gmail/token"),
            microsoft_token_url: endpoint.url("/{tenant}/oauth2/v2.0/token"),
            ..Endpoints::default()
        }
    }

    fn manager<S: TokenStore>(store: S, endpoint: &TokenEndpoint) -> TokenManager<S> {
        TokenManager::new(store).with_endpoints(endpoints(endpoint))
    }

    #[tokio::test]
    async fn fresh_token_is_used_as_is() {
        let endpoint = TokenEndpoint::start(200, REFRESHED).await.unwrap();
        let manager = manager(MemoryStore::default(), &endpoint);

        let token = assert_ok!(
            manager
                .access_token("acct", &OAuth2Credential::gmail("id", "secret"), Some(&valid()))
                .await
        );
        assert!(!token.refreshed);
        assert_eq!(token.state.access_token, "live-access");
        assert_eq!(endpoint.hits(), 0);
        assert!(manager.store().saved().is_empty());
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_once_and_saved() {
        let endpoint = TokenEndpoint::start(200, REFRESHED).await.unwrap();
        let manager = manager(MemoryStore::default(), &endpoint);
        let credential = OAuth2Credential::microsoft("id", "secret", "contoso");

        let token = assert_ok!(manager.access_token("acct", &credential, Some(&expired())).await);
        assert!(token.refreshed);
        assert_eq!(token.state.access_token, "new-access");
        assert_eq!(token.state.refresh_token, "the-refresh");

        let requests = endpoint.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, "/contoso/oauth2/v2.0/token");
        assert_eq!(
            requests[0].form("scope"),
            Some("https://outlook.office365.com/SMTP.Send offline_access")
        );
        assert_eq!(manager.store().saved(), vec![("acct".to_string(), token.state)]);
    }

    #[tokio::test]
    async fn skew_refreshes_before_expiry() {
        let endpoint = TokenEndpoint::start(200, REFRESHED).await.unwrap();
        let manager = manager(MemoryStore::default(), &endpoint).with_skew(Duration::minutes(2));
        let nearly_expired = TokenState::new("a", "r", Utc::now() + Duration::seconds(30));

        let token = assert_ok!(
            manager
                .access_token("acct", &OAuth2Credential::gmail("id", "secret"), Some(&nearly_expired))
                .await
        );
        assert!(token.refreshed);
        assert_eq!(endpoint.requests()[0].path, "/gmail/token");
    }

    #[tokio::test]
    async fn concurrent_refreshes_are_single_flight() {
        let endpoint =
            TokenEndpoint::start_with_delay(200, REFRESHED, std::time::Duration::from_millis(50))
                .await
                .unwrap();
        let manager = manager(MemoryStore::default(), &endpoint);
        let credential = OAuth2Credential::gmail("id", "secret");
        let stale = expired();

        let (a, b) = tokio::join!(
            manager.access_token("acct", &credential, Some(&stale)),
            manager.access_token("acct", &credential, Some(&stale)),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(endpoint.hits(), 1);
        assert_eq!(a.state, b.state);
        assert!(a.refreshed ^ b.refreshed);
        assert_eq!(manager.store().saved().len(), 1);
    }

    #[tokio::test]
    async fn accounts_refresh_independently() {
        let endpoint = TokenEndpoint::start(200, REFRESHED).await.unwrap();
        let manager = manager(MemoryStore::default(), &endpoint);
        let credential = OAuth2Credential::gmail("id", "secret");

        assert_ok!(manager.access_token("one", &credential, Some(&expired())).await);
        assert_ok!(manager.access_token("two", &credential, Some(&expired())).await);
        assert_eq!(endpoint.hits(), 2);
    }

    #[tokio::test]
    async fn invalid_credential_fails_before_network() {
        let endpoint = TokenEndpoint::start(200, REFRESHED).await.unwrap();
        let manager = manager(MemoryStore::default(), &endpoint);

        let err = assert_err!(
            manager
                .access_token("acct", &OAuth2Credential::gmail("", "secret"), Some(&expired()))
                .await
        );
        assert!(err.is_config());
        assert_eq!(endpoint.hits(), 0);
    }

    #[tokio::test]
    async fn missing_token_state_cannot_refresh() {
        let endpoint = TokenEndpoint::start(200, REFRESHED).await.unwrap();
        let manager = manager(MemoryStore::default(), &endpoint);

        let err = assert_err!(
            manager
                .access_token("acct", &OAuth2Credential::gmail("id", "secret"), None)
                .await
        );
        assert!(matches!(err, Error::NoRefreshToken));
    }

    #[tokio::test]
    async fn store_failure_is_reported() {
        let endpoint = TokenEndpoint::start(200, REFRESHED).await.unwrap();
        let manager = manager(FailingStore, &endpoint);

        let err = assert_err!(
            manager
                .access_token("acct", &OAuth2Credential::gmail("id", "secret"), Some(&expired()))
                .await
        );
        assert!(matches!(err, Error::Persist(ref e) if e.to_string() == "disk full"));
    }

    #[tokio::test]
    async fn refused_grant_is_not_saved() {
        let endpoint = TokenEndpoint::start(400, r#"{"error":"invalid_grant"}"#)
            .await
            .unwrap();
        let manager = manager(MemoryStore::default(), &endpoint);

        let err = assert_err!(
            manager
                .access_token("acct", &OAuth2Credential::gmail("id", "secret"), Some(&expired()))
                .await
        );
        assert!(matches!(err, Error::OAuth { .. }));
        assert!(manager.store().saved().is_empty());
    }

    #[tokio::test]
    async fn rotated_refresh_token_is_used_for_the_next_refresh() {
        let endpoint = TokenEndpoint::start(
            200,
            r#"{"access_token":"short","expires_in":0,"refresh_token":"rotated"}"#,
        )
        .await
        .unwrap();
        let manager = manager(MemoryStore::default(), &endpoint);
        let credential = OAuth2Credential::gmail("id", "secret");
        let stale = expired();

        assert_ok!(manager.access_token("acct", &credential, Some(&stale)).await);
        assert_ok!(manager.access_token("acct", &credential, Some(&stale)).await);

        let requests = endpoint.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].form("refresh_token"), Some("the-refresh"));
        assert_eq!(requests[1].form("refresh_token"), Some("rotated"));
    }

    #[tokio::test]
    async fn stale_caller_follows_repeated_rotation() {
        let endpoint = TokenEndpoint::start(200, r#"{"access_token":"short","expires_in":0}"#)
            .await
            .unwrap();
        let manager = manager(MemoryStore::default(), &endpoint);
        let credential = OAuth2Credential::gmail("id", "secret");
        let original = expired();
        let rotated = TokenState::new("x", "rotated", Utc::now() - Duration::minutes(5));

        // Seed a lineage the-refresh -> rotated, as if the provider rotated once.
        assert_ok!(manager.access_token("acct", &credential, Some(&original)).await);
        {
            let slot = manager.slot("acct");
            let mut cached = slot.lock().await;
            cached.as_mut().unwrap().state = rotated.clone();
        }
        assert_ok!(manager.access_token("acct", &credential, Some(&rotated)).await);

        // A caller still holding the very first grant follows the lineage.
        assert_ok!(manager.access_token("acct", &credential, Some(&original)).await);

        let requests = endpoint.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[1].form("refresh_token"), Some("rotated"));
        assert_eq!(requests[2].form("refresh_token"), Some("rotated"));
    }

    #[tokio::test]
    async fn reauthorized_grant_replaces_cached_refresh_token() {
        let endpoint = TokenEndpoint::start(200, r#"{"access_token":"short","expires_in":0}"#)
            .await
            .unwrap();
        let manager = manager(MemoryStore::default(), &endpoint);
        let credential = OAuth2Credential::gmail("id", "secret");

        let before = TokenState::new("a", "old-refresh", Utc::now() - Duration::minutes(5));
        assert_ok!(manager.access_token("acct", &credential, Some(&before)).await);

        let after = TokenState::new("b", "reauthorized-refresh", Utc::now() - Duration::minutes(5));
        let token = assert_ok!(manager.access_token("acct", &credential, Some(&after)).await);
        assert!(token.refreshed);
        assert_eq!(token.state.refresh_token, "reauthorized-refresh");

        let requests = endpoint.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].form("refresh_token"), Some("reauthorized-refresh"));
    }

    #[tokio::test]
    async fn fresh_token_from_an_older_grant_is_not_reused() {
        let endpoint = TokenEndpoint::start(200, REFRESHED).await.unwrap();
        let manager = manager(MemoryStore::default(), &endpoint);
        let credential = OAuth2Credential::gmail("id", "secret");

        assert_ok!(manager.access_token("acct", &credential, Some(&expired())).await);

        let reauthorized = TokenState::new("", "new-grant", Utc::now() - Duration::minutes(5));
        let token = assert_ok!(manager.access_token("acct", &credential, Some(&reauthorized)).await);
        assert!(token.refreshed);
        assert_eq!(endpoint.hits(), 2);
        assert_eq!(endpoint.requests()[1].form("refresh_token"), Some("new-grant"));
    }
}
