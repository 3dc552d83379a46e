//! Low-level SMTP stream handling.

use crate::error::{Error, Result};
use rustls::pki_types::ServerName;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::{
    TlsConnector,
    rustls::{ClientConfig, RootCertStore},
};
use tracing::debug;

/// SMTP stream (TCP or TLS).
#[derive(Debug)]
pub enum SmtpStream {
    /// Plain TCP connection.
    Tcp(BufReader<TcpStream>),
    /// TLS-encrypted connection.
    Tls(Box<BufReader<tokio_rustls::client::TlsStream<TcpStream>>>),
}

impl SmtpStream {
    /// Reads one line, stripping the trailing CRLF.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the peer closed the connection.
    pub async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let read = match self {
            Self::Tcp(reader) => reader.read_line(&mut line).await?,
            Self::Tls(reader) => reader.read_line(&mut line).await?,
        };
        if read == 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "server closed the connection",
            )));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Writes data to the stream and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Tcp(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await?;
            }
            Self::Tls(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await?;
            }
        }
        Ok(())
    }

    /// Returns true if the stream is encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// Upgrades a TCP stream to TLS after a successful `STARTTLS`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is already encrypted or the TLS
    /// handshake fails.
    pub async fn upgrade_to_tls(self, hostname: &str, config: Arc<ClientConfig>) -> Result<Self> {
        let tcp_stream = match self {
            Self::Tcp(reader) => reader.into_inner(),
            Self::Tls(_) => return Err(Error::Protocol("already using TLS".into())),
        };
        handshake(hostname, tcp_stream, config).await
    }
}

/// Connects to an SMTP server over plain TCP.
///
/// # Errors
///
/// Returns an error if the connection fails.
pub async fn connect(hostname: &str, port: u16) -> Result<SmtpStream> {
    debug!(hostname, port, "connecting over TCP");
    let stream = TcpStream::connect((hostname, port)).await?;
    Ok(SmtpStream::Tcp(BufReader::new(stream)))
}

/// Connects to an SMTP server over TLS (implicit TLS, usually port 465).
///
/// # Errors
///
/// Returns an error if the connection or TLS handshake fails.
pub async fn connect_tls(
    hostname: &str,
    port: u16,
    config: Arc<ClientConfig>,
) -> Result<SmtpStream> {
    debug!(hostname, port, "connecting over TLS");
    let tcp_stream = TcpStream::connect((hostname, port)).await?;
    handshake(hostname, tcp_stream, config).await
}

async fn handshake(
    hostname: &str,
    tcp_stream: TcpStream,
    config: Arc<ClientConfig>,
) -> Result<SmtpStream> {
    let server_name = ServerName::try_from(hostname.to_string())
        .map_err(|_| Error::Protocol(format!("invalid hostname: {hostname}")))?;

    let tls_stream = TlsConnector::from(config)
        .connect(server_name, tcp_stream)
        .await?;
    debug!(hostname, "TLS established");
    Ok(SmtpStream::Tls(Box::new(BufReader::new(tls_stream))))
}

/// Client TLS configuration trusting the webpki root certificates.
///
/// # Errors
///
/// Returns an error if the crypto provider rejects the protocol versions.
pub fn default_tls_config() -> Result<Arc<ClientConfig>> {
    tls_config(RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    })
}

/// Client TLS configuration trusting only `roots`, for private relays and
/// test certificate authorities.
///
/// # Errors
///
/// Returns an error if the crypto provider rejects the protocol versions.
pub fn tls_config(roots: RootCertStore) -> Result<Arc<ClientConfig>> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Protocol(format!("TLS configuration: {e}")))?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(Arc::new(config))
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
    use crate::testing::{ScriptedServer, TestTls, standard};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn read_line_reports_eof() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"220 hello\r\n").await.unwrap();
        });

        let mut stream = connect("127.0.0.1", port).await.unwrap();
        assert!(!stream.is_tls());
        assert_eq!(stream.read_line().await.unwrap(), "220 hello");
        server.await.unwrap();

        let err = stream.read_line().await.unwrap_err();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn default_config_trusts_webpki_roots() {
        let config = default_tls_config().unwrap();
        assert!(config.alpn_protocols.is_empty());
        assert!(tls_config(RootCertStore::empty()).is_ok());
    }

    #[tokio::test]
    async fn untrusted_certificate_fails_handshake() {
        let tls = TestTls::generate().unwrap();
        let server = ScriptedServer::start_implicit_tls("220 secure.test", standard(&[]), &tls)
            .await
            .unwrap();

        // Only the webpki roots are trusted, so the test CA is not.
        let err = connect_tls("127.0.0.1", server.port(), default_tls_config().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn implicit_tls_reads_greeting() {
        let tls = TestTls::generate().unwrap();
        let server = ScriptedServer::start_implicit_tls("220 secure.test", standard(&[]), &tls)
            .await
            .unwrap();

        let mut stream = connect_tls("127.0.0.1", server.port(), tls.client_config())
            .await
            .unwrap();
        assert!(stream.is_tls());
        assert_eq!(stream.read_line().await.unwrap(), "220 secure.test");
    }
}
