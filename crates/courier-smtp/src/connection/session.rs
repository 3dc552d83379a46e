//! SMTP session state machine.

use super::{ServerInfo, SmtpStream, connect, connect_tls, default_tls_config};
use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::{is_last_reply_line, parse_reply};
use crate::sasl::Mechanism;
use crate::types::{Address, Reply, ReplyCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rustls::ClientConfig;
use std::sync::Arc;
use tracing::{debug, warn};

/// How the transport is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    /// TLS from the first byte (SMTPS, usually port 465).
    Implicit,
    /// Plain TCP, upgraded with STARTTLS when the server advertises it.
    Opportunistic,
}

/// Where a [`Session`] is in the SMTP dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Greeted and EHLO done; no transaction open.
    Ready,
    /// SASL exchange succeeded; no transaction open.
    Authenticated,
    /// `MAIL FROM` accepted.
    MailStarted,
    /// At least one `RCPT TO` accepted.
    RecipientAdded,
}

impl SessionState {
    const fn is_idle(self) -> bool {
        matches!(self, Self::Ready | Self::Authenticated)
    }
}

/// One SMTP conversation, owned by a single send.
///
/// Operations check the current [`SessionState`] at runtime and fail with
/// [`Error::InvalidState`] when called out of order. A failed operation
/// leaves the connection owned by the session, so [`Session::quit`] stays
/// available on every path.
#[derive(Debug)]
pub struct Session {
    stream: SmtpStream,
    server_info: ServerInfo,
    state: SessionState,
    authenticated: bool,
}

impl Session {
    /// Dials the server, reads the greeting and sends EHLO.
    ///
    /// With [`Security::Opportunistic`] the session upgrades to TLS if the
    /// server advertises STARTTLS, then repeats EHLO. A failed upgrade fails
    /// the whole connect; there is no fallback to plaintext.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection, greeting, EHLO or TLS upgrade
    /// fails.
    pub async fn connect(
        host: &str,
        port: u16,
        security: Security,
        client_name: &str,
    ) -> Result<Self> {
        Self::connect_with_tls(host, port, security, client_name, default_tls_config()?).await
    }

    /// Like [`Session::connect`], verifying the server against `tls`
    /// instead of the webpki roots.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection, greeting, EHLO or TLS upgrade
    /// fails.
    pub async fn connect_with_tls(
        host: &str,
        port: u16,
        security: Security,
        client_name: &str,
        tls: Arc<ClientConfig>,
    ) -> Result<Self> {
        let stream = match security {
            Security::Implicit => connect_tls(host, port, Arc::clone(&tls)).await?,
            Security::Opportunistic => connect(host, port).await?,
        };

        let mut session = Self::from_stream(stream).await?;
        session.ehlo(client_name).await?;

        if security == Security::Opportunistic && session.server_info.supports_starttls() {
            session = session.starttls(host, client_name, tls).await?;
        }
        Ok(session)
    }

    /// Wraps an established stream and reads the server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the greeting fails or the server is not
    /// ready.
    pub async fn from_stream(mut stream: SmtpStream) -> Result<Self> {
        let greeting = read_reply(&mut stream)
            .await?
            .expect_code(ReplyCode::SERVICE_READY)?;

        let hostname = greeting
            .lines
            .first()
            .and_then(|line| line.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();
        debug!(server = %hostname, "greeted");

        Ok(Self {
            stream,
            server_info: ServerInfo {
                hostname,
                ..ServerInfo::default()
            },
            state: SessionState::Ready,
            authenticated: false,
        })
    }

    /// Sends EHLO and records the advertised extensions.
    ///
    /// # Errors
    ///
    /// Returns an error if a transaction is open or the server rejects EHLO.
    pub async fn ehlo(&mut self, client_name: &str) -> Result<()> {
        self.ensure("send EHLO", SessionState::is_idle)?;
        let reply = self
            .send_command(Command::Ehlo {
                hostname: client_name.to_string(),
            })
            .await?
            .into_success()?;

        self.server_info.extensions = ServerInfo::parse_extensions(&reply.lines);
        debug!(extensions = ?self.server_info.extensions, "EHLO accepted");
        Ok(())
    }

    async fn starttls(
        mut self,
        host: &str,
        client_name: &str,
        tls: Arc<ClientConfig>,
    ) -> Result<Self> {
        self.ensure("start TLS", |s| s == SessionState::Ready)?;
        self.send_command(Command::StartTls)
            .await?
            .expect_code(ReplyCode::SERVICE_READY)?;

        let Self { stream, server_info, .. } = self;
        let stream = stream.upgrade_to_tls(host, tls).await?;

        // RFC 3207 §4.2: forget everything learned before the upgrade.
        let mut session = Self {
            stream,
            server_info: ServerInfo {
                hostname: server_info.hostname,
                ..ServerInfo::default()
            },
            state: SessionState::Ready,
            authenticated: false,
        };
        session.ehlo(client_name).await?;
        Ok(session)
    }

    /// Runs a SASL exchange with `mechanism`.
    ///
    /// Sends `AUTH` with the mechanism's initial response, answers each `334`
    /// challenge through [`Mechanism::next`] and succeeds on `235`. When the
    /// mechanism refuses a challenge the exchange is cancelled with `*`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] if the server does not advertise the
    /// mechanism, [`Error::Sasl`] if the mechanism fails, or
    /// [`Error::SmtpError`] if the server rejects the credentials.
    pub async fn authenticate(&mut self, mechanism: &mut dyn Mechanism) -> Result<()> {
        self.ensure("authenticate", |s| s == SessionState::Ready)?;
        let kind = mechanism.kind();
        if !self.server_info.supports_auth(kind) {
            return Err(Error::NotSupported(format!("AUTH {kind}")));
        }

        let initial_response = mechanism.start()?.map(|ir| STANDARD.encode(ir));
        let mut reply = self
            .send_command(Command::Auth {
                mechanism: kind,
                initial_response,
            })
            .await?;

        loop {
            match reply.code {
                ReplyCode::AUTH_SUCCESS => {
                    debug!(mechanism = %kind, "authenticated");
                    self.state = SessionState::Authenticated;
                    self.authenticated = true;
                    return Ok(());
                }
                ReplyCode::AUTH_CONTINUE => {
                    let answer = STANDARD
                        .decode(reply.text().trim())
                        .map_err(|e| Error::Sasl(format!("undecodable challenge: {e}")))
                        .and_then(|challenge| mechanism.next(&challenge));
                    match answer {
                        Ok(response) => {
                            reply = self
                                .send_command(Command::AuthResponse(STANDARD.encode(response)))
                                .await?;
                        }
                        Err(e) => {
                            self.cancel_auth().await;
                            return Err(e);
                        }
                    }
                }
                _ => return Err(Error::smtp_error(reply.code.as_u16(), reply.text())),
            }
        }
    }

    async fn cancel_auth(&mut self) {
        match self.send_command(Command::AuthCancel).await {
            Ok(reply) => debug!(code = %reply.code, "SASL exchange cancelled"),
            Err(e) => warn!(error = %e, "failed to cancel SASL exchange"),
        }
    }

    /// Starts a transaction with `MAIL FROM`.
    ///
    /// # Errors
    ///
    /// Returns an error if a transaction is already open or the server
    /// rejects the sender.
    pub async fn mail_from(&mut self, from: &Address) -> Result<()> {
        self.ensure("start a transaction", SessionState::is_idle)?;
        self.send_command(Command::MailFrom { from: from.clone() })
            .await?
            .into_success()?;
        self.state = SessionState::MailStarted;
        Ok(())
    }

    /// Adds a recipient with `RCPT TO`.
    ///
    /// # Errors
    ///
    /// Returns an error if no transaction is open or the server rejects the
    /// recipient.
    pub async fn rcpt_to(&mut self, to: &Address) -> Result<()> {
        self.ensure("add a recipient", |s| {
            matches!(s, SessionState::MailStarted | SessionState::RecipientAdded)
        })?;
        self.send_command(Command::RcptTo { to: to.clone() })
            .await?
            .into_success()?;
        self.state = SessionState::RecipientAdded;
        Ok(())
    }

    /// Transmits the message with `DATA` and completes the transaction.
    ///
    /// Line endings are normalized to CRLF and lines starting with `.` are
    /// dot-stuffed. The terminating `.` line is added here.
    ///
    /// # Errors
    ///
    /// Returns an error if no recipient was accepted, the server refuses
    /// `DATA`, or the message is rejected.
    pub async fn send_data(&mut self, message: &[u8]) -> Result<()> {
        self.ensure("send data", |s| s == SessionState::RecipientAdded)?;
        self.send_command(Command::Data)
            .await?
            .expect_code(ReplyCode::START_DATA)?;

        self.stream.write_all(&dot_stuff(message)).await?;
        let reply = read_reply(&mut self.stream).await?;
        debug!(code = %reply.code, "end of data");
        reply.into_success()?;

        self.state = self.idle_state();
        Ok(())
    }

    /// Aborts the open transaction with `RSET`.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the reset.
    pub async fn reset(&mut self) -> Result<()> {
        self.send_command(Command::Rset).await?.into_success()?;
        self.state = self.idle_state();
        Ok(())
    }

    /// Sends `QUIT` and closes the connection. Allowed in any state.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails or the server does not confirm.
    pub async fn quit(mut self) -> Result<()> {
        let reply = self.send_command(Command::Quit).await?;
        if reply.code == ReplyCode::CLOSING || reply.is_success() {
            Ok(())
        } else {
            Err(Error::smtp_error(reply.code.as_u16(), reply.text()))
        }
    }

    /// Current dialogue state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Capabilities advertised by the server.
    #[must_use]
    pub const fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Returns true if the transport is encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        self.stream.is_tls()
    }

    const fn idle_state(&self) -> SessionState {
        if self.authenticated {
            SessionState::Authenticated
        } else {
            SessionState::Ready
        }
    }

    fn ensure(&self, operation: &'static str, allowed: impl Fn(SessionState) -> bool) -> Result<()> {
        if allowed(self.state) {
            Ok(())
        } else {
            Err(Error::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    async fn send_command(&mut self, cmd: Command) -> Result<Reply> {
        debug!(command = %cmd.redacted(), "C:");
        self.stream.write_all(&cmd.serialize()).await?;
        let reply = read_reply(&mut self.stream).await?;
        debug!(code = %reply.code, "S:");
        Ok(reply)
    }
}

async fn read_reply(stream: &mut SmtpStream) -> Result<Reply> {
    let mut lines = Vec::new();
    loop {
        let line = stream.read_line().await?;
        if line.is_empty() {
            continue;
        }

        let is_last = is_last_reply_line(&line);
        lines.push(line);

        if is_last {
            break;
        }
    }

    parse_reply(&lines)
}

/// Normalizes line endings to CRLF, dot-stuffs (RFC 5321 §4.5.2) and
/// appends the `.` terminator.
fn dot_stuff(message: &[u8]) -> Vec<u8> {
    let body = message
        .strip_suffix(b"\n")
        .map_or(message, |rest| rest.strip_suffix(b"\r").unwrap_or(rest));

    let mut out = Vec::with_capacity(message.len() + message.len() / 64 + 5);
    if !body.is_empty() {
        for line in body.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.first() == Some(&b'.') {
                out.push(b'.');
            }
            out.extend_from_slice(line);
            out.extend_from_slice(b"\r\n");
        }
    }
    out.extend_from_slice(b".\r\n");
    out
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
    use crate::sasl::{Login, Plain, XOAuth2};
    use crate::testing::{Action, ScriptedServer, TestTls, ehlo_reply, standard};

    const GREETING: &str = "220 mock.test ESMTP ready";

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    async fn open(server: &ScriptedServer) -> Session {
        Session::connect("127.0.0.1", server.port(), Security::Opportunistic, "client.test")
            .await
            .unwrap()
    }

    #[test]
    fn dot_stuffing() {
        assert_eq!(dot_stuff(b"a\r\n.b\r\n"), b"a\r\n..b\r\n.\r\n".to_vec());
        assert_eq!(dot_stuff(b"bare\nlines\n"), b"bare\r\nlines\r\n.\r\n".to_vec());
        assert_eq!(dot_stuff(b"no newline"), b"no newline\r\n.\r\n".to_vec());
        assert_eq!(dot_stuff(b"."), b"..\r\n.\r\n".to_vec());
        assert_eq!(dot_stuff(b""), b".\r\n".to_vec());
    }

    #[tokio::test]
    async fn full_transaction() {
        let server = ScriptedServer::start(GREETING, standard(&["AUTH PLAIN LOGIN", "SIZE 1000"]))
            .await
            .unwrap();

        let mut session = open(&server).await;
        assert_eq!(session.server_info().hostname, "mock.test");
        assert_eq!(session.server_info().max_message_size(), Some(1000));
        assert!(!session.is_tls());

        session.authenticate(&mut Plain::new("user", "pass")).await.unwrap();
        assert_eq!(session.state(), SessionState::Authenticated);

        session.mail_from(&addr("from@example.com")).await.unwrap();
        session.rcpt_to(&addr("to@example.org")).await.unwrap();
        session.rcpt_to(&addr("cc@example.org")).await.unwrap();
        session
            .send_data(b"Subject: hi\r\n\r\n.leading dot\r\n")
            .await
            .unwrap();
        assert_eq!(session.state(), SessionState::Authenticated);
        session.quit().await.unwrap();

        assert_eq!(
            server.commands(),
            vec![
                "EHLO client.test",
                "AUTH PLAIN AHVzZXIAcGFzcw==",
                "MAIL FROM:<from@example.com>",
                "RCPT TO:<to@example.org>",
                "RCPT TO:<cc@example.org>",
                "DATA",
                ".",
                "QUIT",
            ]
        );
        assert_eq!(server.messages(), vec!["Subject: hi\r\n\r\n.leading dot\r\n"]);
    }

    #[tokio::test]
    async fn login_mechanism_answers_prompts() {
        let mut base = standard(&["AUTH LOGIN"]);
        let mut step = 0;
        let handler = move |cmd: &str| {
            if cmd.starts_with("AUTH") || step > 0 {
                step += 1;
                match step {
                    // "Username:" / "Password:"
                    1 => Action::reply("334 VXNlcm5hbWU6"),
                    2 => Action::reply("334 UGFzc3dvcmQ6"),
                    _ => {
                        step = 0;
                        Action::reply("235 2.7.0 Accepted")
                    }
                }
            } else {
                base(cmd)
            }
        };
        let server = ScriptedServer::start(GREETING, handler).await.unwrap();

        let mut session = open(&server).await;
        session.authenticate(&mut Login::new("alice", "s3cret")).await.unwrap();
        session.quit().await.unwrap();

        assert_eq!(
            server.commands(),
            vec!["EHLO client.test", "AUTH LOGIN", "YWxpY2U=", "czNjcmV0", "QUIT"]
        );
    }

    #[tokio::test]
    async fn xoauth2_challenge_is_cancelled() {
        let mut base = standard(&["AUTH XOAUTH2"]);
        let handler = move |cmd: &str| {
            if cmd.starts_with("AUTH") {
                // {"status":"401"}
                Action::reply("334 eyJzdGF0dXMiOiI0MDEifQ==")
            } else {
                base(cmd)
            }
        };
        let server = ScriptedServer::start(GREETING, handler).await.unwrap();

        let mut session = open(&server).await;
        let err = session
            .authenticate(&mut XOAuth2::new("me@example.com", "stale"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Sasl(ref msg) if msg.contains("401")));
        assert_eq!(session.state(), SessionState::Ready);
        session.quit().await.unwrap();

        assert_eq!(server.verbs(), vec!["EHLO", "AUTH", "*", "QUIT"]);
    }

    #[tokio::test]
    async fn rejected_credentials() {
        let mut base = standard(&["AUTH PLAIN"]);
        let handler = move |cmd: &str| {
            if cmd.starts_with("AUTH") {
                Action::reply("535 5.7.8 Authentication credentials invalid")
            } else {
                base(cmd)
            }
        };
        let server = ScriptedServer::start(GREETING, handler).await.unwrap();

        let mut session = open(&server).await;
        let err = session
            .authenticate(&mut Plain::new("user", "wrong"))
            .await
            .unwrap_err();
        assert_eq!(err.reply_code(), Some(535));
        session.quit().await.unwrap();
    }

    #[tokio::test]
    async fn unadvertised_mechanism_is_not_attempted() {
        let server = ScriptedServer::start(GREETING, standard(&["AUTH PLAIN"]))
            .await
            .unwrap();

        let mut session = open(&server).await;
        let err = session
            .authenticate(&mut XOAuth2::new("me@example.com", "token"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotSupported(_)));
        session.quit().await.unwrap();

        assert_eq!(server.verbs(), vec!["EHLO", "QUIT"]);
    }

    #[tokio::test]
    async fn rejected_recipient_keeps_session_usable() {
        let mut base = standard(&[]);
        let handler = move |cmd: &str| {
            if cmd.starts_with("RCPT TO:<nobody@") {
                Action::reply("550 5.1.1 No such user")
            } else {
                base(cmd)
            }
        };
        let server = ScriptedServer::start(GREETING, handler).await.unwrap();

        let mut session = open(&server).await;
        session.mail_from(&addr("from@example.com")).await.unwrap();
        let err = session.rcpt_to(&addr("nobody@example.org")).await.unwrap_err();
        assert!(err.is_permanent());
        assert_eq!(session.state(), SessionState::MailStarted);

        session.reset().await.unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        session.quit().await.unwrap();

        assert_eq!(server.verbs(), vec!["EHLO", "MAIL", "RCPT", "RSET", "QUIT"]);
    }

    #[tokio::test]
    async fn operations_out_of_order() {
        let server = ScriptedServer::start(GREETING, standard(&["AUTH PLAIN"]))
            .await
            .unwrap();

        let mut session = open(&server).await;
        let err = session.send_data(b"x").await.unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidState {
                state: SessionState::Ready,
                ..
            }
        ));
        assert!(session.rcpt_to(&addr("a@b.com")).await.is_err());

        session.mail_from(&addr("from@example.com")).await.unwrap();
        assert!(session.mail_from(&addr("from@example.com")).await.is_err());
        assert!(
            session
                .authenticate(&mut Plain::new("u", "p"))
                .await
                .is_err()
        );
        session.quit().await.unwrap();

        // Nothing out of order reached the wire.
        assert_eq!(server.verbs(), vec!["EHLO", "MAIL", "QUIT"]);
    }

    #[tokio::test]
    async fn failed_starttls_handshake_fails_connect() {
        let server = ScriptedServer::start(GREETING, standard(&["STARTTLS", "AUTH PLAIN"]))
            .await
            .unwrap();

        let err = Session::connect(
            "127.0.0.1",
            server.port(),
            Security::Opportunistic,
            "client.test",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Io(_) | Error::Protocol(_)));
        assert_eq!(server.verbs(), vec!["EHLO", "STARTTLS"]);
    }

    #[tokio::test]
    async fn starttls_upgrade_repeats_ehlo_then_authenticates() {
        let tls = TestTls::generate().unwrap();
        let mut upgraded = false;
        let mut base = standard(&[]);
        let handler = move |cmd: &str| match cmd.split(' ').next() {
            // Only the encrypted EHLO offers AUTH.
            Some("EHLO") if upgraded => {
                Action::Reply(ehlo_reply("mock.test", &["AUTH PLAIN", "SIZE 500"]))
            }
            Some("EHLO") => Action::Reply(ehlo_reply("mock.test", &["STARTTLS"])),
            Some("STARTTLS") => {
                upgraded = true;
                base(cmd)
            }
            _ => base(cmd),
        };
        let server = ScriptedServer::start_with_starttls(GREETING, handler, &tls)
            .await
            .unwrap();

        let mut session = Session::connect_with_tls(
            "127.0.0.1",
            server.port(),
            Security::Opportunistic,
            "client.test",
            tls.client_config(),
        )
        .await
        .unwrap();
        assert!(session.is_tls());
        assert_eq!(session.state(), SessionState::Ready);
        assert!(!session.server_info().supports_starttls());
        assert_eq!(session.server_info().max_message_size(), Some(500));

        session.authenticate(&mut Plain::new("user", "pass")).await.unwrap();
        session.mail_from(&addr("from@example.com")).await.unwrap();
        session.rcpt_to(&addr("to@example.org")).await.unwrap();
        session.send_data(b"Subject: hi\r\n\r\nbody\r\n").await.unwrap();
        session.quit().await.unwrap();

        assert_eq!(
            server.verbs(),
            vec!["EHLO", "STARTTLS", "EHLO", "AUTH", "MAIL", "RCPT", "DATA", ".", "QUIT"]
        );
        assert_eq!(
            server.encrypted_verbs(),
            vec!["EHLO", "AUTH", "MAIL", "RCPT", "DATA", ".", "QUIT"]
        );
        assert_eq!(server.commands()[3], "AUTH PLAIN AHVzZXIAcGFzcw==");
    }

    #[tokio::test]
    async fn implicit_tls_transaction() {
        let tls = TestTls::generate().unwrap();
        let server = ScriptedServer::start_implicit_tls(GREETING, standard(&["AUTH PLAIN"]), &tls)
            .await
            .unwrap();

        let mut session = Session::connect_with_tls(
            "127.0.0.1",
            server.port(),
            Security::Implicit,
            "client.test",
            tls.client_config(),
        )
        .await
        .unwrap();
        assert!(session.is_tls());

        session.authenticate(&mut Plain::new("user", "pass")).await.unwrap();
        session.mail_from(&addr("from@example.com")).await.unwrap();
        session.rcpt_to(&addr("to@example.org")).await.unwrap();
        session.send_data(b"hello\r\n").await.unwrap();
        session.quit().await.unwrap();

        assert_eq!(server.encrypted_verbs(), server.verbs());
        assert_eq!(server.messages(), vec!["hello\r\n"]);
    }

    #[tokio::test]
    async fn refused_starttls_fails_connect() {
        let mut base = standard(&["STARTTLS"]);
        let handler = move |cmd: &str| {
            if cmd == "STARTTLS" {
                Action::reply("454 4.7.0 TLS not available")
            } else {
                base(cmd)
            }
        };
        let server = ScriptedServer::start(GREETING, handler).await.unwrap();

        let err = Session::connect(
            "127.0.0.1",
            server.port(),
            Security::Opportunistic,
            "client.test",
        )
        .await
        .unwrap_err();
        assert_eq!(err.reply_code(), Some(454));
    }

    #[tokio::test]
    async fn bad_greeting() {
        let server = ScriptedServer::start("554 5.3.2 go away", standard(&[]))
            .await
            .unwrap();

        let err = Session::connect(
            "127.0.0.1",
            server.port(),
            Security::Opportunistic,
            "client.test",
        )
        .await
        .unwrap_err();
        assert_eq!(err.reply_code(), Some(554));
    }

    #[tokio::test]
    async fn hangup_is_an_io_error() {
        let mut base = standard(&[]);
        let handler = move |cmd: &str| {
            if cmd.starts_with("MAIL") {
                Action::Hangup
            } else {
                base(cmd)
            }
        };
        let server = ScriptedServer::start(GREETING, handler).await.unwrap();

        let mut session = open(&server).await;
        let err = session.mail_from(&addr("from@example.com")).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
