//! # courier-smtp
//!
//! SMTP submission client (RFC 5321) for sending one message per session.
//!
//! ## Features
//!
//! - **Runtime state machine**: [`Session`] rejects out-of-order commands
//!   with [`Error::InvalidState`] while keeping the connection available for
//!   `QUIT`
//! - **TLS**: implicit TLS or opportunistic STARTTLS, verified against the
//!   webpki roots or any [`rustls::ClientConfig`] passed to
//!   [`Session::connect_with_tls`]
//! - **SASL**: PLAIN, LOGIN and `XOAUTH2` through the [`Mechanism`] trait
//!
//! ## Quick Start
//!
//! ```ignore
//! use courier_smtp::{Address, Security, Session, sasl::Plain};
//!
//! let mut session = Session::connect("smtp.example.com", 587, Security::Opportunistic, "client.example.com").await?;
//! session.authenticate(&mut Plain::new("user@example.com", "password")).await?;
//! session.mail_from(&Address::new("user@example.com")?).await?;
//! session.rcpt_to(&Address::new("recipient@example.org")?).await?;
//! session.send_data(b"Subject: Test\r\n\r\nHello, World!\r\n").await?;
//! session.quit().await?;
//! ```
//!
//! ## Session States
//!
//! ```text
//! Ready ── authenticate() ──→ Authenticated
//!   │                              │
//!   └──────── mail_from() ─────────┘
//!                 ↓
//!            MailStarted ── rcpt_to() ──→ RecipientAdded ── send_data() ──→ Ready / Authenticated
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod sasl;
pub mod types;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use rustls;

pub use connection::{
    Security, ServerInfo, Session, SessionState, default_tls_config, tls_config,
};
pub use error::{Error, Result};
pub use sasl::Mechanism;
pub use types::{Address, AuthMechanism, Extension, Reply, ReplyClass, ReplyCode};
