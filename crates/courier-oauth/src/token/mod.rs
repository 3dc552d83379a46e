//! `OAuth2` token state and wire types.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Lifetime assumed when a token response carries no `expires_in`.
pub const DEFAULT_EXPIRES_IN: u64 = 3600;

/// Cached token material for one account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenState {
    /// Bearer token used for `XOAUTH2`.
    pub access_token: String,
    /// Long-lived token exchanged for new access tokens.
    pub refresh_token: String,
    /// Instant the access token stops being accepted.
    pub expires_at: DateTime<Utc>,
}

impl TokenState {
    /// Creates a token state.
    #[must_use]
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
        }
    }

    /// True if the access token is present and still valid `skew` after
    /// `now`. A zero skew compares against the exact expiry instant, and a
    /// skew reaching past the representable range is never fresh.
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        !self.access_token.is_empty()
            && now
                .checked_add_signed(skew)
                .is_some_and(|deadline| self.expires_at > deadline)
    }

    /// Builds the next state from a refresh response, keeping
    /// `previous_refresh_token` when the server did not rotate it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidResponse`] if the access token is empty.
    pub fn from_response(
        response: TokenResponse,
        previous_refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, Error> {
        if response.access_token.is_empty() {
            return Err(Error::InvalidResponse("empty access_token".into()));
        }
        let lifetime = i64::try_from(response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN))
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);

        Ok(Self {
            access_token: response.access_token,
            refresh_token: response
                .refresh_token
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| previous_refresh_token.to_string()),
            expires_at: now
                .checked_add_signed(lifetime)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        })
    }
}

impl fmt::Debug for TokenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenState")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Token response from `OAuth2` server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    /// Access token.
    pub access_token: String,
    /// Token type.
    #[serde(default)]
    pub token_type: Option<String>,
    /// Expires in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    /// Refresh token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Error response from `OAuth2` server.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    /// Error code.
    pub error: String,
    /// Error description.
    #[serde(default)]
    pub error_description: String,
}

impl ErrorResponse {
    /// Converts to an Error.
    #[must_use]
    pub fn into_error(self) -> Error {
        Error::oauth_error(self.error, self.error_description)
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
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn freshness_boundary() {
        let token = TokenState::new("access", "refresh", at(0));
        assert!(token.is_fresh(at(-1), Duration::zero()));
        assert!(!token.is_fresh(at(0), Duration::zero()));
        assert!(!token.is_fresh(at(1), Duration::zero()));
    }

    #[test]
    fn skew_refreshes_early() {
        let token = TokenState::new("access", "refresh", at(0));
        assert!(token.is_fresh(at(-120), Duration::seconds(60)));
        assert!(!token.is_fresh(at(-30), Duration::seconds(60)));
    }

    #[test]
    fn unrepresentable_skew_is_stale() {
        let token = TokenState::new("a", "r", DateTime::<Utc>::MAX_UTC);
        assert!(!token.is_fresh(at(0), Duration::MAX));
        assert!(token.is_fresh(at(0), Duration::days(1)));
    }

    #[test]
    fn empty_access_token_is_stale() {
        let token = TokenState::new("", "refresh", at(3600));
        assert!(!token.is_fresh(at(0), Duration::zero()));
    }

    #[test]
    fn response_keeps_previous_refresh_token() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token":"new","token_type":"Bearer","expires_in":3599}"#)
                .unwrap();
        let state = TokenState::from_response(response, "old-refresh", at(0)).unwrap();
        assert_eq!(state.access_token, "new");
        assert_eq!(state.refresh_token, "old-refresh");
        assert_eq!(state.expires_at, at(3599));
    }

    #[test]
    fn response_rotates_refresh_token() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"access_token":"new","refresh_token":"rotated","expires_in":60}"#,
        )
        .unwrap();
        let state = TokenState::from_response(response, "old", at(0)).unwrap();
        assert_eq!(state.refresh_token, "rotated");
    }

    #[test]
    fn missing_lifetime_uses_default() {
        let response: TokenResponse = serde_json::from_str(r#"{"access_token":"new"}"#).unwrap();
        let state = TokenState::from_response(response, "r", at(0)).unwrap();
        assert_eq!(state.expires_at, at(3600));
    }

    #[test]
    fn empty_access_token_is_invalid() {
        let response: TokenResponse = serde_json::from_str(r#"{"access_token":""}"#).unwrap();
        assert!(matches!(
            TokenState::from_response(response, "r", at(0)),
            Err(Error::InvalidResponse(_))
        ));
    }

    #[test]
    fn error_response() {
        let response: ErrorResponse = serde_json::from_str(
            r#"{"error":"invalid_grant","error_description":"Token has been revoked."}"#,
        )
        .unwrap();
        assert!(matches!(
            response.into_error(),
            Error::OAuth { ref error, .. } if error == "invalid_grant"
        ));
    }

    #[test]
    fn serde_round_trip_keeps_secrets() {
        let token = TokenState::new("a", "r", at(0));
        let json = serde_json::to_string(&token).unwrap();
        assert_eq!(serde_json::from_str::<TokenState>(&json).unwrap(), token);
        assert!(!format!("{token:?}").contains("\"a\""));
    }
}
