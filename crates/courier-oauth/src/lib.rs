//! # courier-oauth
//!
//! `OAuth2` refresh-token lifecycle for SMTP `XOAUTH2` authentication.
//!
//! ## Features
//!
//! - **Credentials**: [`OAuth2Credential`]; a tenant selects Microsoft, no
//!   tenant selects Gmail
//! - **Providers**: production endpoints with overridable [`Endpoints`]
//!   templates
//! - **Token management**: [`TokenManager`] checks freshness, refreshes
//!   single-flight per account and persists through a [`TokenStore`]
//! - **Consent**: [`OAuthClient::authorization_url`] and
//!   [`OAuthClient::exchange_code`] obtain an account's first refresh token
//!
//! ## Quick Start
//!
//! ```ignore
//! use courier_oauth::{OAuth2Credential, TokenManager};
//!
//! let manager = TokenManager::new(my_store);
//! let credential = OAuth2Credential::microsoft("client-id", "client-secret", "contoso.onmicrosoft.com");
//!
//! let fresh = manager.access_token("account-42", &credential, account.token_state()).await?;
//! if fresh.refreshed {
//!     // already saved through `my_store`
//! }
//! // authenticate with fresh.state.access_token
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod client;
mod credential;
mod error;
mod manager;
pub mod provider;
pub mod token;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use client::OAuthClient;
pub use credential::OAuth2Credential;
pub use error::{Error, Result, StoreError};
pub use manager::{FreshToken, TokenManager, TokenStore};
pub use provider::{Endpoints, Provider, ProviderKind};
pub use token::TokenState;
