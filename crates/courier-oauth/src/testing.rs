//! Scripted in-process token endpoint for tests.
//!
//! Serves plain HTTP/1.1 on `127.0.0.1:0`, records every request's path and
//! form body, and answers with the configured status and JSON document.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// A request received by [`TokenEndpoint`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    /// Request path, e.g. `/contoso/oauth2/v2.0/token`.
    pub path: String,
    /// Decoded `application/x-www-form-urlencoded` fields.
    pub fields: HashMap<String, String>,
}

impl TokenRequest {
    /// Returns a form field.
    #[must_use]
    pub fn form(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// A running token endpoint. Aborted on drop.
#[derive(Debug)]
pub struct TokenEndpoint {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<TokenRequest>>>,
    task: JoinHandle<()>,
}

impl TokenEndpoint {
    /// Answers every request with `status` and `body`.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start(status: u16, body: impl Into<String>) -> io::Result<Self> {
        Self::start_with_delay(status, body, Duration::ZERO).await
    }

    /// Like [`Self::start`], holding each response for `delay`.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start_with_delay(
        status: u16,
        body: impl Into<String>,
        delay: Duration,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let requests = Arc::new(Mutex::new(Vec::new()));
        let body: Arc<str> = Arc::from(body.into());

        let log = Arc::clone(&requests);
        let task = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let log = Arc::clone(&log);
                let body = Arc::clone(&body);
                tokio::spawn(async move {
                    if let Err(e) = respond(socket, status, &body, delay, &log).await {
                        tracing::debug!(error = %e, "token endpoint connection ended");
                    }
                });
            }
        });

        Ok(Self {
            addr,
            requests,
            task,
        })
    }

    /// Absolute URL for `path` on this endpoint.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<TokenRequest> {
        lock(&self.requests).clone()
    }

    /// Number of requests received so far.
    #[must_use]
    pub fn hits(&self) -> usize {
        lock(&self.requests).len()
    }
}

impl Drop for TokenEndpoint {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn respond(
    mut socket: TcpStream,
    status: u16,
    body: &str,
    delay: Duration,
    log: &Mutex<Vec<TokenRequest>>,
) -> io::Result<()> {
    let request = read_request(&mut socket).await?;
    lock(log).push(request);

    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let reason = if (200..300).contains(&status) { "OK" } else { "Error" };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await
}

async fn read_request(socket: &mut TcpStream) -> io::Result<TokenRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated request head"));
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let path = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let end = buf.len().min(header_end + content_length);
    let fields = url::form_urlencoded::parse(&buf[header_end..end])
        .into_owned()
        .collect();
    Ok(TokenRequest { path, fields })
}
