//! # courier-core
//!
//! Sends notification email from configured accounts.
//!
//! This crate provides:
//! - Account records with password or `OAuth2` authentication
//! - Account validation
//! - AES-GCM encryption for stored passwords
//! - Engine configuration from serde or `COURIER_*` variables
//! - [`EmailSender`], which refreshes tokens, builds the MIME message and
//!   drives one SMTP session per send
//!
//! ## Example
//!
//! ```ignore
//! use courier_core::{EmailSender, EngineConfig, FromEnv};
//!
//! let sender = EmailSender::new(&EngineConfig::from_env()?, store)?;
//! let report = sender.send(&mut account, &message).await?;
//! if report.refreshed_token {
//!     // account now carries the new token state
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod account;
pub mod config;
pub mod crypto;
mod error;
pub mod service;

pub use account::{
    AccountId, Authentication, EmailAccount, EmailAddress, LoginCredential, ProjectId,
    ValidationError, ValidationResult, validate_account,
};
pub use config::{ConfigError, EngineConfig, FromEnv};
pub use crypto::{Cipher, CryptoError};
pub use error::{Error, ErrorKind, Result};
pub use service::{EmailSender, SendReport};
