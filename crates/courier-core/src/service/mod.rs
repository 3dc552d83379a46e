//! Core services for email operations.
//!
//! This module provides the service layer that drives the MIME, `OAuth2`
//! and SMTP crates for one account.

mod sender;

pub use sender::{EmailSender, SendReport};
