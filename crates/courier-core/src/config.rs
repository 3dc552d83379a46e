//! Engine configuration.
//!
//! [`EngineConfig`] deserializes with defaults for everything except the
//! encryption key, or loads from `COURIER_*` environment variables through
//! [`FromEnv`].

use std::fmt;
use std::time::Duration;

use courier_oauth::Endpoints;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{Cipher, CryptoError};

/// Base64 AES key for stored passwords. Required.
pub const ENV_ENCRYPTION_KEY: &str = "COURIER_ENCRYPTION_KEY";
/// Name sent with EHLO.
pub const ENV_EHLO_NAME: &str = "COURIER_EHLO_NAME";
/// Seconds before expiry at which tokens count as stale.
pub const ENV_TOKEN_SKEW_SECS: &str = "COURIER_TOKEN_SKEW_SECS";
/// Overall deadline for one send, in seconds.
pub const ENV_SEND_TIMEOUT_SECS: &str = "COURIER_SEND_TIMEOUT_SECS";
/// Gmail token endpoint override.
pub const ENV_GMAIL_TOKEN_URL: &str = "COURIER_GMAIL_TOKEN_URL";
/// Microsoft token endpoint template override (`{tenant}` placeholder).
pub const ENV_MICROSOFT_TOKEN_URL: &str = "COURIER_MICROSOFT_TOKEN_URL";
/// Gmail consent URL override.
pub const ENV_GMAIL_AUTH_URL: &str = "COURIER_GMAIL_AUTH_URL";
/// Microsoft consent URL template override (`{tenant}` placeholder).
pub const ENV_MICROSOFT_AUTH_URL: &str = "COURIER_MICROSOFT_AUTH_URL";

/// Largest accepted token skew: one day.
pub const MAX_TOKEN_SKEW_SECS: u64 = 86_400;

/// Configuration error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is unset.
    #[error("Environment variable '{0}' is required but not set")]
    MissingEnvVar(String),

    /// A variable is set but unusable.
    #[error("Failed to parse environment variable '{key}': {details}")]
    ParseError {
        /// Variable name.
        key: String,
        /// What was wrong with it.
        details: String,
    },
}

/// Configuration that can be loaded from environment variables.
pub trait FromEnv: Sized {
    /// Loads from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a variable is missing or malformed.
    fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a variable is missing or malformed.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError>;
}

/// Settings shared by every send.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base64 AES-128/192/256 key for stored passwords.
    pub encryption_key: String,
    /// Hostname announced in EHLO.
    pub ehlo_name: String,
    /// Seconds subtracted from token expiry when judging freshness.
    pub token_skew_secs: u64,
    /// Deadline for a whole send. `None` means no deadline.
    pub send_timeout_secs: Option<u64>,
    /// `OAuth2` provider endpoints.
    pub endpoints: Endpoints,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            encryption_key: String::new(),
            ehlo_name: "localhost".to_string(),
            token_skew_secs: 0,
            send_timeout_secs: None,
            endpoints: Endpoints::default(),
        }
    }
}

impl EngineConfig {
    /// Creates a config with defaults and the given key.
    #[must_use]
    pub fn new(encryption_key: impl Into<String>) -> Self {
        Self {
            encryption_key: encryption_key.into(),
            ..Self::default()
        }
    }

    /// Token freshness skew, capped at [`MAX_TOKEN_SKEW_SECS`].
    #[must_use]
    pub fn token_skew(&self) -> chrono::Duration {
        i64::try_from(self.token_skew_secs.min(MAX_TOKEN_SKEW_SECS))
            .map_or_else(|_| chrono::Duration::zero(), chrono::Duration::seconds)
    }

    /// Overall send deadline.
    #[must_use]
    pub fn send_timeout(&self) -> Option<Duration> {
        self.send_timeout_secs.map(Duration::from_secs)
    }

    /// Builds the password cipher from the configured key.
    ///
    /// # Errors
    ///
    /// Returns a [`CryptoError`] if the key is not base64 or has the wrong
    /// length.
    pub fn cipher(&self) -> Result<Cipher, CryptoError> {
        Cipher::from_base64(&self.encryption_key)
    }
}

impl FromEnv for EngineConfig {
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let encryption_key = env_required(&lookup, ENV_ENCRYPTION_KEY)?;
        Cipher::from_base64(&encryption_key).map_err(|e| ConfigError::ParseError {
            key: ENV_ENCRYPTION_KEY.to_string(),
            details: e.to_string(),
        })?;

        let token_skew_secs = env_parse(&lookup, ENV_TOKEN_SKEW_SECS)?
            .unwrap_or(defaults.token_skew_secs);
        if token_skew_secs > MAX_TOKEN_SKEW_SECS {
            return Err(ConfigError::ParseError {
                key: ENV_TOKEN_SKEW_SECS.to_string(),
                details: format!("must be at most {MAX_TOKEN_SKEW_SECS} seconds"),
            });
        }

        Ok(Self {
            encryption_key,
            ehlo_name: env_or_default(&lookup, ENV_EHLO_NAME, &defaults.ehlo_name),
            token_skew_secs,
            send_timeout_secs: env_parse(&lookup, ENV_SEND_TIMEOUT_SECS)?,
            endpoints: Endpoints::from_lookup(&lookup)?,
        })
    }
}

/// Provider endpoints, each overridable on its own. Needs no encryption key.
impl FromEnv for Endpoints {
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            gmail_auth_url: env_or_default(&lookup, ENV_GMAIL_AUTH_URL, &defaults.gmail_auth_url),
            gmail_token_url: env_or_default(&lookup, ENV_GMAIL_TOKEN_URL, &defaults.gmail_token_url),
            microsoft_auth_url: env_or_default(
                &lookup,
                ENV_MICROSOFT_AUTH_URL,
                &defaults.microsoft_auth_url,
            ),
            microsoft_token_url: env_or_default(
                &lookup,
                ENV_MICROSOFT_TOKEN_URL,
                &defaults.microsoft_token_url,
            ),
        })
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("encryption_key", &"<redacted>")
            .field("ehlo_name", &self.ehlo_name)
            .field("token_skew_secs", &self.token_skew_secs)
            .field("send_timeout_secs", &self.send_timeout_secs)
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

/// Looks up `key`, falling back to `default` when unset.
pub fn env_or_default(lookup: impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    lookup(key).unwrap_or_else(|| default.to_string())
}

/// Looks up `key`, failing when unset or empty.
///
/// # Errors
///
/// Returns [`ConfigError::MissingEnvVar`].
pub fn env_required(lookup: impl Fn(&str) -> Option<String>, key: &str) -> Result<String, ConfigError> {
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn env_parse<T>(lookup: impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError::ParseError {
                key: key.to_string(),
                details: e.to_string(),
            })
        })
        .transpose()
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
    use std::collections::HashMap;

    const KEY: &str = "AAECAwQFBgcICQoLDA0ODw==";

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[(ENV_ENCRYPTION_KEY, KEY)])).unwrap();
        assert_eq!(config.ehlo_name, "localhost");
        assert_eq!(config.token_skew(), chrono::Duration::zero());
        assert_eq!(config.send_timeout(), None);
        assert_eq!(config.endpoints, Endpoints::default());
        assert_eq!(config.cipher().unwrap().key_bits(), 128);
    }

    #[test]
    fn test_overrides() {
        let config = EngineConfig::from_lookup(lookup(&[
            (ENV_ENCRYPTION_KEY, KEY),
            (ENV_EHLO_NAME, "mailer.example.com"),
            (ENV_TOKEN_SKEW_SECS, "60"),
            (ENV_SEND_TIMEOUT_SECS, " 30 "),
            (ENV_MICROSOFT_TOKEN_URL, "http://127.0.0.1:9/{tenant}/token"),
        ]))
        .unwrap();

        assert_eq!(config.ehlo_name, "mailer.example.com");
        assert_eq!(config.token_skew(), chrono::Duration::seconds(60));
        assert_eq!(config.send_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.endpoints.microsoft_token_url, "http://127.0.0.1:9/{tenant}/token");
        assert_eq!(config.endpoints.gmail_token_url, Endpoints::default().gmail_token_url);
    }

    #[test]
    fn test_missing_key() {
        let err = EngineConfig::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err, ConfigError::MissingEnvVar(ENV_ENCRYPTION_KEY.to_string()));
    }

    #[test]
    fn test_bad_key() {
        let err = EngineConfig::from_lookup(lookup(&[(ENV_ENCRYPTION_KEY, "c2hvcnQ=")])).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { key, .. } if key == ENV_ENCRYPTION_KEY));
    }

    #[test]
    fn test_bad_number() {
        let err = EngineConfig::from_lookup(lookup(&[
            (ENV_ENCRYPTION_KEY, KEY),
            (ENV_SEND_TIMEOUT_SECS, "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { key, .. } if key == ENV_SEND_TIMEOUT_SECS));
    }

    #[test]
    fn test_skew_out_of_range() {
        let err = EngineConfig::from_lookup(lookup(&[
            (ENV_ENCRYPTION_KEY, KEY),
            (ENV_TOKEN_SKEW_SECS, "10000000000000"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { key, .. } if key == ENV_TOKEN_SKEW_SECS));

        let config = EngineConfig::from_lookup(lookup(&[
            (ENV_ENCRYPTION_KEY, KEY),
            (ENV_TOKEN_SKEW_SECS, "86400"),
        ]))
        .unwrap();
        assert_eq!(config.token_skew(), chrono::Duration::days(1));
    }

    #[test]
    fn test_deserialized_skew_is_capped() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"token_skew_secs": 18446744073709551615}"#).unwrap();
        assert_eq!(config.token_skew(), chrono::Duration::days(1));
    }

    #[test]
    fn test_from_process_env() {
        temp_env::with_vars(
            [
                (ENV_ENCRYPTION_KEY, Some(KEY)),
                (ENV_EHLO_NAME, Some("relay.internal")),
                (ENV_TOKEN_SKEW_SECS, None),
            ],
            || {
                let config = EngineConfig::from_env().unwrap();
                assert_eq!(config.ehlo_name, "relay.internal");
                assert_eq!(config.token_skew_secs, 0);
            },
        );
    }

    #[test]
    fn test_endpoints_without_key() {
        let endpoints = Endpoints::from_lookup(lookup(&[(
            ENV_GMAIL_AUTH_URL,
            "http://127.0.0.1:9/consent",
        )]))
        .unwrap();
        assert_eq!(endpoints.gmail_auth_url, "http://127.0.0.1:9/consent");
        assert_eq!(endpoints.gmail_token_url, Endpoints::default().gmail_token_url);
        assert_eq!(endpoints.microsoft_auth_url, Endpoints::default().microsoft_auth_url);
    }

    #[test]
    fn test_env_or_default() {
        assert_eq!(env_or_default(lookup(&[("A", "x")]), "A", "d"), "x");
        assert_eq!(env_or_default(lookup(&[]), "A", "d"), "d");
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"encryption_key": "k"}"#).unwrap();
        assert_eq!(config.ehlo_name, "localhost");
        assert!(!format!("{config:?}").contains("\"k\""));
    }
}
