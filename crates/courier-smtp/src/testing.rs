//! Scripted in-process SMTP server for tests.
//!
//! The server binds `127.0.0.1:0`, greets every connection, records each
//! command line and answers with whatever the handler returns. After a `354`
//! reply to `DATA` it collects the message up to the lone `.` line, stores it
//! with dot-stuffing undone, and asks the handler for the reply to `.`.
//!
//! [`Action::StartTls`] upgrades the connection when the server was started
//! with a [`TestTls`] and closes it otherwise, which lets tests exercise both
//! a working and a failed upgrade.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rcgen::{BasicConstraints, Certificate, CertificateParams, DnType, IsCa, SanType};
use rustls::ClientConfig;
use rustls::RootCertStore;
use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

use crate::connection::tls_config;

/// What the server does in response to a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send the reply and keep reading. Multi-line replies separate their
    /// lines with CRLF.
    Reply(String),
    /// Send the reply, then close the connection.
    Close(String),
    /// Send the reply, then run the TLS server handshake. Without a
    /// [`TestTls`] the connection is closed instead.
    StartTls(String),
    /// Close the connection without replying.
    Hangup,
}

enum Next {
    Continue,
    Close,
    Upgrade,
}

impl Action {
    /// Shorthand for [`Action::Reply`].
    #[must_use]
    pub fn reply(text: impl Into<String>) -> Self {
        Self::Reply(text.into())
    }

    fn is_start_data(&self) -> bool {
        matches!(self, Self::Reply(text) if text.starts_with("354"))
    }

    async fn perform<W: AsyncWrite + Unpin>(self, writer: &mut W) -> io::Result<Next> {
        match self {
            Self::Reply(text) => {
                writer.write_all(format!("{text}\r\n").as_bytes()).await?;
                Ok(Next::Continue)
            }
            Self::Close(text) => {
                writer.write_all(format!("{text}\r\n").as_bytes()).await?;
                writer.shutdown().await?;
                Ok(Next::Close)
            }
            Self::StartTls(text) => {
                writer.write_all(format!("{text}\r\n").as_bytes()).await?;
                writer.flush().await?;
                Ok(Next::Upgrade)
            }
            Self::Hangup => Ok(Next::Close),
        }
    }
}

/// A throwaway certificate authority and a server certificate it signed
/// for `localhost` and `127.0.0.1`.
#[derive(Clone)]
pub struct TestTls {
    acceptor: TlsAcceptor,
    client_config: Arc<ClientConfig>,
}

impl std::fmt::Debug for TestTls {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestTls").finish_non_exhaustive()
    }
}

impl TestTls {
    /// Generates a fresh CA and server certificate.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation or either TLS config fails.
    pub fn generate() -> io::Result<Self> {
        let mut ca_params = CertificateParams::new(Vec::<String>::new());
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params
            .distinguished_name
            .push(DnType::CommonName, "courier test CA");
        let ca = Certificate::from_params(ca_params).map_err(io::Error::other)?;

        let mut server_params = CertificateParams::new(Vec::<String>::new());
        server_params.subject_alt_names = vec![
            SanType::DnsName("localhost".to_string()),
            SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST)),
        ];
        server_params
            .distinguished_name
            .push(DnType::CommonName, "localhost");
        let server = Certificate::from_params(server_params).map_err(io::Error::other)?;

        let ca_der = CertificateDer::from(ca.serialize_der().map_err(io::Error::other)?);
        let server_der =
            CertificateDer::from(server.serialize_der_with_signer(&ca).map_err(io::Error::other)?);
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(server.serialize_private_key_der()));

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let server_config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(io::Error::other)?
            .with_no_client_auth()
            .with_single_cert(vec![server_der], key)
            .map_err(io::Error::other)?;

        let mut roots = RootCertStore::empty();
        roots.add(ca_der).map_err(io::Error::other)?;

        Ok(Self {
            acceptor: TlsAcceptor::from(Arc::new(server_config)),
            client_config: tls_config(roots).map_err(io::Error::other)?,
        })
    }

    /// Client configuration trusting only the test CA.
    #[must_use]
    pub fn client_config(&self) -> Arc<ClientConfig> {
        Arc::clone(&self.client_config)
    }
}

/// Builds a multi-line `250` EHLO reply.
#[must_use]
pub fn ehlo_reply(domain: &str, extensions: &[&str]) -> String {
    let mut lines = vec![domain.to_string()];
    lines.extend(extensions.iter().map(ToString::to_string));
    let last = lines.len() - 1;
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| format!("250{}{line}", if i == last { ' ' } else { '-' }))
        .collect::<Vec<_>>()
        .join("\r\n")
}

/// A handler that accepts everything, advertising `extensions` after EHLO.
///
/// Wrap it to override single commands:
///
/// ```ignore
/// let mut base = standard(&["AUTH PLAIN"]);
/// let handler = move |cmd: &str| {
///     if cmd.starts_with("RCPT") { Action::reply("550 5.1.1 No such user") } else { base(cmd) }
/// };
/// ```
#[must_use]
pub fn standard(extensions: &[&str]) -> impl FnMut(&str) -> Action + Send + 'static {
    let ehlo = ehlo_reply("mock.test", extensions);
    move |command: &str| match verb(command).as_str() {
        "EHLO" | "HELO" => Action::Reply(ehlo.clone()),
        "STARTTLS" => Action::StartTls("220 2.0.0 Ready to start TLS".into()),
        "AUTH" => Action::reply("235 2.7.0 Authentication successful"),
        "MAIL" | "RCPT" | "RSET" => Action::reply("250 2.1.0 OK"),
        "DATA" => Action::reply("354 Start mail input; end with <CRLF>.<CRLF>"),
        "." => Action::reply("250 2.0.0 OK queued"),
        "*" => Action::reply("501 5.7.0 Authentication cancelled"),
        "QUIT" => Action::Close("221 2.0.0 Bye".into()),
        _ => Action::reply("502 5.5.2 Command not recognized"),
    }
}

/// Upper-cased first word of a command line.
#[must_use]
pub fn verb(command: &str) -> String {
    command
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase()
}

#[derive(Debug, Default)]
struct Log {
    commands: Vec<String>,
    encrypted: Vec<bool>,
    messages: Vec<String>,
}

impl Log {
    fn record(&mut self, command: String, encrypted: bool) {
        self.commands.push(command);
        self.encrypted.push(encrypted);
    }
}

#[derive(Clone)]
enum Mode {
    Plain,
    StartTls(TlsAcceptor),
    Implicit(TlsAcceptor),
}

/// A running scripted server. Aborted on drop.
#[derive(Debug)]
pub struct ScriptedServer {
    addr: SocketAddr,
    log: Arc<Mutex<Log>>,
    task: JoinHandle<()>,
}

impl ScriptedServer {
    /// Binds a plaintext listener and serves connections until dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start<F>(greeting: impl Into<String>, handler: F) -> io::Result<Self>
    where
        F: FnMut(&str) -> Action + Send + 'static,
    {
        Self::bind(greeting.into(), handler, Mode::Plain).await
    }

    /// Like [`Self::start`], completing [`Action::StartTls`] with the
    /// certificate from `tls`.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start_with_starttls<F>(
        greeting: impl Into<String>,
        handler: F,
        tls: &TestTls,
    ) -> io::Result<Self>
    where
        F: FnMut(&str) -> Action + Send + 'static,
    {
        Self::bind(greeting.into(), handler, Mode::StartTls(tls.acceptor.clone())).await
    }

    /// Serves implicit TLS: the handshake runs before the greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start_implicit_tls<F>(
        greeting: impl Into<String>,
        handler: F,
        tls: &TestTls,
    ) -> io::Result<Self>
    where
        F: FnMut(&str) -> Action + Send + 'static,
    {
        Self::bind(greeting.into(), handler, Mode::Implicit(tls.acceptor.clone())).await
    }

    async fn bind<F>(greeting: String, handler: F, mode: Mode) -> io::Result<Self>
    where
        F: FnMut(&str) -> Action + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let log = Arc::new(Mutex::new(Log::default()));
        let handler = Arc::new(Mutex::new(handler));

        let task_log = Arc::clone(&log);
        let task = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let connection = serve(
                    socket,
                    mode.clone(),
                    greeting.clone(),
                    Arc::clone(&handler),
                    Arc::clone(&task_log),
                );
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        tracing::debug!(error = %e, "scripted connection ended");
                    }
                });
            }
        });

        Ok(Self { addr, log, task })
    }

    /// Address the server listens on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Port the server listens on.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Every command line received so far, `.` marking each end of data.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        lock(&self.log).commands.clone()
    }

    /// Upper-cased verbs of [`Self::commands`].
    #[must_use]
    pub fn verbs(&self) -> Vec<String> {
        lock(&self.log).commands.iter().map(|c| verb(c)).collect()
    }

    /// Upper-cased verbs of the commands that arrived over TLS.
    #[must_use]
    pub fn encrypted_verbs(&self) -> Vec<String> {
        let log = lock(&self.log);
        log.commands
            .iter()
            .zip(&log.encrypted)
            .filter(|(_, encrypted)| **encrypted)
            .map(|(c, _)| verb(c))
            .collect()
    }

    /// Message bodies received after `DATA`, CRLF line endings kept.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        lock(&self.log).messages.clone()
    }
}

impl Drop for ScriptedServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn serve<F>(
    socket: TcpStream,
    mode: Mode,
    greeting: String,
    handler: Arc<Mutex<F>>,
    log: Arc<Mutex<Log>>,
) -> io::Result<()>
where
    F: FnMut(&str) -> Action + Send,
{
    match mode {
        Mode::Implicit(acceptor) => {
            let tls = acceptor.accept(socket).await?;
            converse(tls, true, Some(&greeting), &handler, &log).await?;
        }
        Mode::Plain => {
            converse(socket, false, Some(&greeting), &handler, &log).await?;
        }
        Mode::StartTls(acceptor) => {
            if let Some(socket) = converse(socket, false, Some(&greeting), &handler, &log).await? {
                let tls = acceptor.accept(socket).await?;
                // RFC 3207: no new greeting after the handshake.
                converse(tls, true, None, &handler, &log).await?;
            }
        }
    }
    Ok(())
}

/// Runs the command loop. Returns the stream when the handler asked for a
/// TLS upgrade on a connection that is not yet encrypted.
async fn converse<S, F>(
    stream: S,
    encrypted: bool,
    greeting: Option<&str>,
    handler: &Mutex<F>,
    log: &Mutex<Log>,
) -> io::Result<Option<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: FnMut(&str) -> Action + Send,
{
    let (read, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(read);
    if let Some(greeting) = greeting {
        writer.write_all(format!("{greeting}\r\n").as_bytes()).await?;
    }

    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let command = line.trim_end_matches(['\r', '\n']).to_string();
        lock(log).record(command.clone(), encrypted);

        let action = {
            let mut handler = lock(handler);
            (&mut *handler)(&command)
        };
        let enters_data = verb(&command) == "DATA" && action.is_start_data();
        match action.perform(&mut writer).await? {
            Next::Continue => {}
            Next::Close => return Ok(None),
            Next::Upgrade if encrypted => return Ok(None),
            Next::Upgrade => return Ok(Some(reader.into_inner().unsplit(writer))),
        }

        if enters_data {
            let message = read_message(&mut reader).await?;
            {
                let mut log = lock(log);
                log.messages.push(message);
                log.record(".".to_string(), encrypted);
            }
            let action = {
                let mut handler = lock(handler);
                (&mut *handler)(".")
            };
            if !matches!(action.perform(&mut writer).await?, Next::Continue) {
                return Ok(None);
            }
        }
    }
}

async fn read_message<R: AsyncRead + Unpin>(
    reader: &mut BufReader<ReadHalf<R>>,
) -> io::Result<String> {
    let mut message = String::new();
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed during DATA",
            ));
        }
        let content = line.trim_end_matches(['\r', '\n']);
        if content == "." {
            return Ok(message);
        }
        message.push_str(content.strip_prefix('.').unwrap_or(content));
        message.push_str("\r\n");
    }
}
