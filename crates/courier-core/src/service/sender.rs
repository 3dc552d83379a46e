//! Email sending for configured accounts.

use std::sync::Arc;
use std::time::{Duration, Instant};

use courier_mime::{EmailMessage, MessageBuilder};
use courier_oauth::{TokenManager, TokenStore};
use courier_smtp::sasl::{Login, Plain, XOAuth2};
use courier_smtp::rustls::ClientConfig;
use courier_smtp::{Address, AuthMechanism, Mechanism, Session};
use tracing::{debug, info, warn};

use crate::account::{Authentication, EmailAccount, validate_account};
use crate::config::EngineConfig;
use crate::crypto::Cipher;
use crate::error::{Error, Result};

/// Outcome of a successful send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendReport {
    /// An `OAuth2` refresh happened and was written to the account.
    pub refreshed_token: bool,
    /// Recipients the server accepted.
    pub accepted_recipients: usize,
}

/// Plaintext secret for one authentication attempt.
enum Secret {
    Password { username: String, password: String },
    Bearer { user: String, token: String },
}

impl Secret {
    /// Picks the SASL mechanism for what the server advertised. Passwords
    /// use PLAIN unless only LOGIN is offered.
    fn mechanism(self, session: &Session) -> Box<dyn Mechanism> {
        match self {
            Self::Password { username, password } => {
                let info = session.server_info();
                if info.supports_auth(AuthMechanism::Login)
                    && !info.supports_auth(AuthMechanism::Plain)
                {
                    Box::new(Login::new(username, password))
                } else {
                    Box::new(Plain::new(username, password))
                }
            }
            Self::Bearer { user, token } => Box::new(XOAuth2::new(user, token)),
        }
    }
}

struct Envelope {
    from: Address,
    recipients: Vec<Address>,
}

impl Envelope {
    fn new(account: &EmailAccount, message: &EmailMessage) -> Result<Self> {
        let parse = |raw: &str| {
            Address::new(raw.trim()).map_err(|e| Error::Validation(format!("{raw:?}: {e}")))
        };
        Ok(Self {
            from: parse(account.sender.as_str())?,
            recipients: message.recipients().map(parse).collect::<Result<_>>()?,
        })
    }
}

/// Sends messages through an account's SMTP server.
///
/// Cloning is cheap; clones share the cipher and the token manager, so
/// concurrent sends for one `OAuth2` account refresh its token once.
pub struct EmailSender<S> {
    cipher: Arc<Cipher>,
    tokens: Arc<TokenManager<S>>,
    ehlo_name: String,
    send_timeout: Option<Duration>,
    tls: Option<Arc<ClientConfig>>,
}

impl<S> Clone for EmailSender<S> {
    fn clone(&self) -> Self {
        Self {
            cipher: Arc::clone(&self.cipher),
            tokens: Arc::clone(&self.tokens),
            ehlo_name: self.ehlo_name.clone(),
            send_timeout: self.send_timeout,
            tls: self.tls.clone(),
        }
    }
}

impl<S: TokenStore> EmailSender<S> {
    /// Creates a sender from engine settings, saving refreshed tokens to
    /// `store`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encryption`] if the configured key is unusable.
    pub fn new(config: &EngineConfig, store: S) -> Result<Self> {
        let tokens = TokenManager::new(store)
            .with_endpoints(config.endpoints.clone())
            .with_skew(config.token_skew());
        Ok(Self {
            cipher: Arc::new(config.cipher()?),
            tokens: Arc::new(tokens),
            ehlo_name: config.ehlo_name.clone(),
            send_timeout: config.send_timeout(),
            tls: None,
        })
    }

    /// Verifies SMTP servers against `tls` instead of the webpki roots.
    #[must_use]
    pub fn with_tls_config(mut self, tls: Arc<ClientConfig>) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Token manager shared by this sender's clones.
    #[must_use]
    pub fn tokens(&self) -> &TokenManager<S> {
        &self.tokens
    }

    /// Sends `message` from `account` in a single SMTP session.
    ///
    /// An expired `OAuth2` token is refreshed first; the new state is saved
    /// through the [`TokenStore`] and written into `account` even if the send
    /// fails afterwards. A rejected recipient fails the whole send. Once
    /// connected, QUIT is always attempted.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] whose [`kind`](Error::kind) tells which stage
    /// failed.
    pub async fn send(
        &self,
        account: &mut EmailAccount,
        message: &EmailMessage,
    ) -> Result<SendReport> {
        match self.send_timeout {
            Some(limit) => tokio::time::timeout(limit, self.send_inner(account, message))
                .await
                .map_err(|_| Error::Timeout(limit))?,
            None => self.send_inner(account, message).await,
        }
    }

    async fn send_inner(
        &self,
        account: &mut EmailAccount,
        message: &EmailMessage,
    ) -> Result<SendReport> {
        let started = Instant::now();

        validate_account(account).map_err(|errors| {
            Error::Validation(
                errors
                    .iter()
                    .map(|e| format!("{}: {}", e.field(), e.message()))
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        })?;
        message.validate()?;
        let envelope = Envelope::new(account, message)?;

        let (secret, refreshed_token) = self.prepare_secret(account).await?;
        let body = MessageBuilder::new(message).build()?;

        debug!(account = %account.id, host = %account.host, port = account.port, "connecting");
        let connected = match &self.tls {
            Some(tls) => {
                Session::connect_with_tls(
                    &account.host,
                    account.port,
                    account.security(),
                    &self.ehlo_name,
                    Arc::clone(tls),
                )
                .await
            }
            None => {
                Session::connect(&account.host, account.port, account.security(), &self.ehlo_name)
                    .await
            }
        };
        let mut session = connected.map_err(Error::Connectivity)?;

        let outcome = transact(&mut session, secret, &envelope, &body).await;
        if let Err(e) = session.quit().await {
            warn!(account = %account.id, error = %e, "QUIT failed");
        }
        outcome?;

        info!(
            account = %account.id,
            recipients = envelope.recipients.len(),
            bytes = body.len(),
            refreshed_token,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "message sent"
        );
        Ok(SendReport {
            refreshed_token,
            accepted_recipients: envelope.recipients.len(),
        })
    }

    async fn prepare_secret(&self, account: &mut EmailAccount) -> Result<(Secret, bool)> {
        let (credential, current) = match account.authentication() {
            Authentication::Unset => return Err(Error::UnsupportedAuthentication),
            Authentication::Login(login) => {
                let password = self.cipher.decrypt(&login.password)?;
                let secret = Secret::Password {
                    username: login.username.clone(),
                    password,
                };
                return Ok((secret, false));
            }
            Authentication::OAuth2 { credential, token } => (credential.clone(), token.clone()),
        };

        let fresh = self
            .tokens
            .access_token(&account.key(), &credential, current.as_ref())
            .await
            .map_err(|e| {
                if e.is_config() {
                    Error::Validation(e.to_string())
                } else {
                    Error::TokenRefresh(e)
                }
            })?;

        if current.as_ref() != Some(&fresh.state) {
            account
                .set_token_state(fresh.state.clone())
                .map_err(|e| Error::Validation(e.to_string()))?;
        }

        let secret = Secret::Bearer {
            user: account.sender.to_string(),
            token: fresh.state.access_token,
        };
        Ok((secret, fresh.refreshed))
    }
}

async fn transact(
    session: &mut Session,
    secret: Secret,
    envelope: &Envelope,
    body: &[u8],
) -> Result<()> {
    let mut mechanism = secret.mechanism(session);
    session
        .authenticate(mechanism.as_mut())
        .await
        .map_err(Error::Authentication)?;

    session.mail_from(&envelope.from).await.map_err(Error::Transfer)?;
    for recipient in &envelope.recipients {
        session.rcpt_to(recipient).await.map_err(Error::Transfer)?;
    }
    session.send_data(body).await.map_err(Error::Transfer)
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
    use crate::account::{AccountId, EmailAddress, ProjectId};
    use crate::error::ErrorKind;
    use courier_oauth::{OAuth2Credential, StoreError, TokenState};
    use courier_smtp::testing::{ScriptedServer, standard};

    const KEY: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=";

    struct NoStore;

    impl TokenStore for NoStore {
        async fn save(
            &self,
            _account: &str,
            _token: &TokenState,
        ) -> std::result::Result<(), StoreError> {
            Ok(())
        }
    }

    fn sender() -> EmailSender<NoStore> {
        EmailSender::new(&EngineConfig::new(KEY), NoStore).unwrap()
    }

    fn account(port: u16) -> EmailAccount {
        EmailAccount::new(
            AccountId(1),
            ProjectId(1),
            "Alerts",
            "127.0.0.1",
            port,
            false,
            EmailAddress::parse("alerts@example.com").unwrap(),
        )
    }

    fn message() -> EmailMessage {
        EmailMessage::new("Status", "<p>ok</p>", "alerts@example.com", "ops@example.org").unwrap()
    }

    #[test]
    fn rejects_bad_key() {
        let err = EmailSender::new(&EngineConfig::new("c2hvcnQ="), NoStore).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn unset_authentication_fails_before_dialing() {
        let err = sender().send(&mut account(1), &message()).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedAuthentication));
    }

    #[tokio::test]
    async fn invalid_recipient_fails_before_dialing() {
        let sender = sender();
        let mut account = account(1);
        account.set_login("alerts", sender.cipher.encrypt("pw").unwrap());
        let message =
            EmailMessage::new("Status", "<p>ok</p>", "a@example.com", "not an address").unwrap();

        let err = sender.send(&mut account, &message).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn undecryptable_password_is_configuration_error() {
        let mut account = account(1);
        account.set_login("alerts", "Zm9vYmFyYmF6cXV4cXV1eA==");
        let err = sender().send(&mut account, &message()).await.unwrap_err();
        assert!(matches!(err, Error::Encryption(_)));
    }

    #[tokio::test]
    async fn fresh_oauth2_token_is_used_without_refresh() {
        let server = ScriptedServer::start("220 mx ESMTP", standard(&["AUTH XOAUTH2"]))
            .await
            .unwrap();
        let mut account = account(server.port());
        let expires_at = chrono::Utc::now() + chrono::Duration::hours(1);
        let token = TokenState::new("still-good", "r", expires_at);
        account.set_oauth2(OAuth2Credential::gmail("id", "secret"), Some(token.clone()));

        let report = sender().send(&mut account, &message()).await.unwrap();
        assert!(!report.refreshed_token);
        assert_eq!(report.accepted_recipients, 1);
        assert_eq!(account.token_state(), Some(&token));

        let auth = server.commands().into_iter().find(|c| c.starts_with("AUTH")).unwrap();
        assert!(auth.starts_with("AUTH XOAUTH2 "));
    }

    #[tokio::test]
    async fn login_only_server_gets_login_mechanism() {
        let server = ScriptedServer::start("220 mx ESMTP", standard(&["AUTH LOGIN"]))
            .await
            .unwrap();
        let sender = sender();
        let mut account = account(server.port());
        account.set_login("alerts", sender.cipher.encrypt("pw").unwrap());

        sender.send(&mut account, &message()).await.unwrap();
        assert!(server.commands().iter().any(|c| c == "AUTH LOGIN"));
    }
}
