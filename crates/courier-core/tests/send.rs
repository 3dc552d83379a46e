//! End-to-end sends against scripted SMTP and token servers.

#![allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use courier_core::{
    AccountId, Cipher, EmailAccount, EmailAddress, EmailSender, EngineConfig, Error, ErrorKind,
    ProjectId,
};
use courier_mime::EmailMessage;
use courier_oauth::testing::TokenEndpoint;
use courier_oauth::{OAuth2Credential, StoreError, TokenState, TokenStore};
use courier_smtp::testing::{Action, ScriptedServer, TestTls, standard, verb};

const KEY: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=";

#[derive(Debug, Default)]
struct RecordingStore {
    saved: Mutex<Vec<(String, TokenState)>>,
    fail: bool,
}

impl RecordingStore {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn saved(&self) -> Vec<(String, TokenState)> {
        self.saved.lock().unwrap().clone()
    }
}

impl TokenStore for RecordingStore {
    async fn save(&self, account: &str, token: &TokenState) -> Result<(), StoreError> {
        if self.fail {
            return Err("disk full".into());
        }
        self.saved
            .lock()
            .unwrap()
            .push((account.to_string(), token.clone()));
        Ok(())
    }
}

fn config() -> EngineConfig {
    EngineConfig::new(KEY)
}

fn account(port: u16) -> EmailAccount {
    EmailAccount::new(
        AccountId(42),
        ProjectId(7),
        "Billing",
        "127.0.0.1",
        port,
        false,
        EmailAddress::parse("billing@example.com").unwrap(),
    )
}

fn login_account(port: u16) -> EmailAccount {
    let mut account = account(port);
    let password = Cipher::from_base64(KEY).unwrap().encrypt("s3cret").unwrap();
    account.set_login("billing", password);
    account
}

fn message() -> EmailMessage {
    EmailMessage::new(
        "Invoice 42",
        "<p>Your invoice is attached.</p>",
        "Billing <billing@example.com>",
        "customer@example.org",
    )
    .unwrap()
}

fn expired_token() -> TokenState {
    TokenState::new("stale", "refresh-1", Utc::now() - chrono::Duration::minutes(5))
}

#[tokio::test]
async fn login_send_runs_full_transaction() {
    let handler = standard(&["AUTH PLAIN LOGIN", "8BITMIME"]);
    let server = ScriptedServer::start("220 mx.example.org ESMTP", handler)
        .await
        .unwrap();
    let sender = EmailSender::new(&config(), RecordingStore::default()).unwrap();
    let mut account = login_account(server.port());
    let message = message().with_cc("accounts@example.org").with_bcc("audit@example.com");

    let report = sender.send(&mut account, &message).await.unwrap();

    assert_eq!(report.accepted_recipients, 3);
    assert!(!report.refreshed_token);
    assert_eq!(
        server.verbs(),
        vec!["EHLO", "AUTH", "MAIL", "RCPT", "RCPT", "RCPT", "DATA", ".", "QUIT"]
    );

    let commands = server.commands();
    let plain = STANDARD.encode("\0billing\0s3cret");
    assert_eq!(commands[0], "EHLO localhost");
    assert_eq!(commands[1], format!("AUTH PLAIN {plain}"));
    assert_eq!(commands[2], "MAIL FROM:<billing@example.com>");
    assert_eq!(commands[3], "RCPT TO:<customer@example.org>");
    assert_eq!(commands[4], "RCPT TO:<accounts@example.org>");
    assert_eq!(commands[5], "RCPT TO:<audit@example.com>");

    let messages = server.messages();
    assert_eq!(messages.len(), 1);
    let body = &messages[0];
    assert!(body.contains("Subject: Invoice 42\r\n"));
    assert!(body.contains("From: Billing <billing@example.com>\r\n"));
    assert!(body.contains("Cc: accounts@example.org\r\n"));
    assert!(!body.contains("audit@example.com"));
    assert!(body.contains("<p>Your invoice is attached.</p>"));
}

#[tokio::test]
async fn expired_tenant_token_is_refreshed_before_auth() {
    let endpoint = TokenEndpoint::start(
        200,
        r#"{"access_token":"fresh-access","token_type":"Bearer","expires_in":3599}"#,
    )
    .await
    .unwrap();
    let handler = standard(&["AUTH LOGIN XOAUTH2"]);
    let server = ScriptedServer::start("220 smtp.office365.com", handler)
        .await
        .unwrap();

    let mut config = config();
    config.endpoints.microsoft_token_url = endpoint.url("/{tenant}/oauth2/v2.0/token");
    let store = Arc::new(RecordingStore::default());
    let sender = EmailSender::new(&config, Arc::clone(&store)).unwrap();

    let mut account = account(server.port());
    account.set_oauth2(
        OAuth2Credential::microsoft("client-id", "client-secret", "contoso"),
        Some(expired_token()),
    );

    let report = sender.send(&mut account, &message()).await.unwrap();
    assert!(report.refreshed_token);

    let requests = endpoint.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].path, "/contoso/oauth2/v2.0/token");
    assert_eq!(requests[0].form("grant_type"), Some("refresh_token"));
    assert_eq!(requests[0].form("refresh_token"), Some("refresh-1"));
    assert_eq!(requests[0].form("client_id"), Some("client-id"));

    let xoauth2 = STANDARD.encode("user=billing@example.com\x01auth=Bearer fresh-access\x01\x01");
    let commands = server.commands();
    assert_eq!(commands[1], format!("AUTH XOAUTH2 {xoauth2}"));

    let state = account.token_state().unwrap();
    assert_eq!(state.access_token, "fresh-access");
    assert_eq!(state.refresh_token, "refresh-1");
    assert!(state.expires_at > Utc::now());

    let saved = store.saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].0, "42");
    assert_eq!(&saved[0].1, state);
}

#[tokio::test]
async fn rejected_recipient_fails_send_and_quits() {
    let mut base = standard(&["AUTH PLAIN"]);
    let handler = move |command: &str| {
        if command.contains("nobody@") {
            Action::reply("550 5.1.1 No such user")
        } else {
            base(command)
        }
    };
    let server = ScriptedServer::start("220 mx ESMTP", handler).await.unwrap();
    let sender = EmailSender::new(&config(), RecordingStore::default()).unwrap();
    let mut account = login_account(server.port());
    let message = message().with_cc("nobody@example.org");

    let err = sender.send(&mut account, &message).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Transfer);
    assert_eq!(err.reply_code(), Some(550));
    assert!(!err.is_transient());
    assert_eq!(server.verbs(), vec!["EHLO", "AUTH", "MAIL", "RCPT", "RCPT", "QUIT"]);
    assert!(server.messages().is_empty());
}

#[tokio::test]
async fn rejected_credentials_still_quit() {
    let mut base = standard(&["AUTH PLAIN"]);
    let handler = move |command: &str| {
        if verb(command) == "AUTH" {
            Action::reply("535 5.7.8 Authentication credentials invalid")
        } else {
            base(command)
        }
    };
    let server = ScriptedServer::start("220 mx ESMTP", handler).await.unwrap();
    let sender = EmailSender::new(&config(), RecordingStore::default()).unwrap();

    let err = sender
        .send(&mut login_account(server.port()), &message())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert_eq!(server.verbs(), vec!["EHLO", "AUTH", "QUIT"]);
}

#[tokio::test]
async fn failed_starttls_is_connectivity_error() {
    let server = ScriptedServer::start("220 mx ESMTP", standard(&["STARTTLS", "AUTH PLAIN"]))
        .await
        .unwrap();
    let sender = EmailSender::new(&config(), RecordingStore::default()).unwrap();

    let err = sender
        .send(&mut login_account(server.port()), &message())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Connectivity(_)));
    assert!(!server.verbs().contains(&"AUTH".to_string()));
}

#[tokio::test]
async fn login_send_upgrades_with_starttls() {
    let tls = TestTls::generate().unwrap();
    let server = ScriptedServer::start_with_starttls(
        "220 mx ESMTP",
        standard(&["STARTTLS", "AUTH PLAIN"]),
        &tls,
    )
    .await
    .unwrap();
    let sender = EmailSender::new(&config(), RecordingStore::default())
        .unwrap()
        .with_tls_config(tls.client_config());

    let report = sender
        .send(&mut login_account(server.port()), &message())
        .await
        .unwrap();

    assert_eq!(report.accepted_recipients, 1);
    assert_eq!(
        server.verbs(),
        vec!["EHLO", "STARTTLS", "EHLO", "AUTH", "MAIL", "RCPT", "DATA", ".", "QUIT"]
    );
    assert_eq!(
        server.encrypted_verbs(),
        vec!["EHLO", "AUTH", "MAIL", "RCPT", "DATA", ".", "QUIT"]
    );
    assert_eq!(
        server.commands()[3],
        format!("AUTH PLAIN {}", STANDARD.encode("\0billing\0s3cret"))
    );
}

#[tokio::test]
async fn implicit_tls_account_sends() {
    let tls = TestTls::generate().unwrap();
    let server = ScriptedServer::start_implicit_tls("220 mx ESMTP", standard(&["AUTH PLAIN"]), &tls)
        .await
        .unwrap();
    let sender = EmailSender::new(&config(), RecordingStore::default())
        .unwrap()
        .with_tls_config(tls.client_config());
    let mut account = login_account(server.port());
    account.use_tls = true;

    let report = sender.send(&mut account, &message()).await.unwrap();

    assert_eq!(report.accepted_recipients, 1);
    assert_eq!(server.encrypted_verbs(), server.verbs());
    assert_eq!(server.messages().len(), 1);
    assert!(server.messages()[0].contains("Subject: Invoice 42\r\n"));
}

#[tokio::test]
async fn implicit_tls_with_untrusted_certificate_is_connectivity_error() {
    let tls = TestTls::generate().unwrap();
    let server = ScriptedServer::start_implicit_tls("220 mx ESMTP", standard(&["AUTH PLAIN"]), &tls)
        .await
        .unwrap();
    let sender = EmailSender::new(&config(), RecordingStore::default()).unwrap();
    let mut account = login_account(server.port());
    account.use_tls = true;

    let err = sender.send(&mut account, &message()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Connectivity);
    assert!(server.verbs().is_empty());
}

#[tokio::test]
async fn unset_authentication_never_connects() {
    let server = ScriptedServer::start("220 mx ESMTP", standard(&["AUTH PLAIN"]))
        .await
        .unwrap();
    let sender = EmailSender::new(&config(), RecordingStore::default()).unwrap();

    let err = sender
        .send(&mut account(server.port()), &message())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::UnsupportedAuthentication));
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(server.commands().is_empty());
}

#[tokio::test]
async fn refresh_failure_never_connects() {
    let endpoint = TokenEndpoint::start(
        400,
        r#"{"error":"invalid_grant","error_description":"refresh token revoked"}"#,
    )
    .await
    .unwrap();
    let server = ScriptedServer::start("220 mx ESMTP", standard(&["AUTH XOAUTH2"]))
        .await
        .unwrap();

    let mut config = config();
    config.endpoints.gmail_token_url = endpoint.url("/token");
    let sender = EmailSender::new(&config, RecordingStore::default()).unwrap();
    let mut account = account(server.port());
    account.set_oauth2(OAuth2Credential::gmail("id", "secret"), Some(expired_token()));

    let err = sender.send(&mut account, &message()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TokenRefresh);
    assert!(err.to_string().contains("invalid_grant"));
    assert_eq!(endpoint.hits(), 1);
    assert!(server.commands().is_empty());
    let state = account.token_state().unwrap();
    assert_eq!(state.access_token, "stale");
    assert_eq!(state.refresh_token, "refresh-1");
}

#[tokio::test]
async fn store_failure_is_token_refresh_error() {
    let endpoint = TokenEndpoint::start(200, r#"{"access_token":"new","expires_in":3600}"#)
        .await
        .unwrap();
    let mut config = config();
    config.endpoints.gmail_token_url = endpoint.url("/token");
    let sender = EmailSender::new(&config, RecordingStore::failing()).unwrap();
    let mut account = account(1);
    account.set_oauth2(OAuth2Credential::gmail("id", "secret"), Some(expired_token()));

    let err = sender.send(&mut account, &message()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TokenRefresh);
    assert!(matches!(err, Error::TokenRefresh(courier_oauth::Error::Persist(_))));
    assert_eq!(account.token_state().unwrap().access_token, "stale");
}

#[tokio::test]
async fn silent_server_times_out() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let _hold = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(socket);
    });

    let mut config = config();
    config.send_timeout_secs = Some(1);
    let sender = EmailSender::new(&config, RecordingStore::default()).unwrap();

    let err = sender
        .send(&mut login_account(port), &message())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Timeout(limit) if limit == Duration::from_secs(1)));
    assert_eq!(err.kind(), ErrorKind::Timeout);
}
