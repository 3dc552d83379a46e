//! Token persistence into the account file.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use courier_core::EmailAccount;
use courier_oauth::{StoreError, TokenState, TokenStore};
use tokio::sync::Mutex;

/// Reads an account file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not an account.
pub async fn load_account(path: &Path) -> anyhow::Result<EmailAccount> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

/// Writes an account file, replacing it atomically.
///
/// # Errors
///
/// Returns an error if serialization or any file operation fails.
pub async fn write_account(path: &Path, account: &EmailAccount) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(account)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

/// [`TokenStore`] that updates the token inside one account file.
#[derive(Debug)]
pub struct AccountFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl AccountFileStore {
    /// Creates a store for the account at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn write_token(&self, key: &str, token: &TokenState) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let mut account = load_account(&self.path).await?;
        if account.key() != key {
            bail!("{} holds account {}, not {key}", self.path.display(), account.key());
        }
        account.set_token_state(token.clone())?;
        write_account(&self.path, &account).await
    }
}

impl TokenStore for AccountFileStore {
    async fn save(&self, account: &str, token: &TokenState) -> Result<(), StoreError> {
        self.write_token(account, token).await.map_err(Into::into)
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
    use chrono::Utc;
    use courier_core::{AccountId, EmailAddress, ProjectId};
    use courier_oauth::OAuth2Credential;

    fn oauth_account(id: i64) -> EmailAccount {
        let mut account = EmailAccount::new(
            AccountId(id),
            ProjectId(1),
            "Ops",
            "smtp.gmail.com",
            465,
            true,
            EmailAddress::parse("ops@example.com").unwrap(),
        );
        account.set_oauth2(OAuth2Credential::gmail("id", "secret"), None);
        account
    }

    #[tokio::test]
    async fn saves_token_into_account_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("account.json");
        write_account(&path, &oauth_account(5)).await.unwrap();

        let store = AccountFileStore::new(&path);
        let token = TokenState::new("access", "refresh", Utc::now());
        store.save("5", &token).await.unwrap();

        let reloaded = load_account(&path).await.unwrap();
        assert_eq!(reloaded.token_state(), Some(&token));
        assert!(!dir.path().join("account.json.tmp").exists());
    }

    #[tokio::test]
    async fn rejects_other_account() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("account.json");
        write_account(&path, &oauth_account(5)).await.unwrap();

        let store = AccountFileStore::new(&path);
        let token = TokenState::new("access", "refresh", Utc::now());
        assert!(store.save("6", &token).await.is_err());
        assert!(load_account(&path).await.unwrap().token_state().is_none());
    }

    #[tokio::test]
    async fn missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = AccountFileStore::new(dir.path().join("absent.json"));
        let token = TokenState::new("access", "refresh", Utc::now());
        assert!(store.save("1", &token).await.is_err());
    }
}
