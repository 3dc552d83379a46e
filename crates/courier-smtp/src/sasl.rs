//! SASL mechanisms for SMTP AUTH.
//!
//! A [`Mechanism`] produces raw client responses; the session driver handles
//! base64 framing and the `334`/`235` reply codes (RFC 4954).

use std::fmt;

use crate::error::{Error, Result};
use crate::types::AuthMechanism;

/// A client-side SASL mechanism.
pub trait Mechanism: Send {
    /// Wire name of the mechanism.
    fn kind(&self) -> AuthMechanism;

    /// Returns the initial response sent with the `AUTH` command, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the mechanism was already started.
    fn start(&mut self) -> Result<Option<Vec<u8>>>;

    /// Answers a decoded server challenge.
    ///
    /// # Errors
    ///
    /// Returns an error if the challenge is not legal in the current step.
    /// The driver then cancels the exchange.
    fn next(&mut self, challenge: &[u8]) -> Result<Vec<u8>>;
}

/// PLAIN (RFC 4616): a single `authzid NUL authcid NUL passwd` message.
pub struct Plain {
    username: String,
    password: String,
    started: bool,
}

impl Plain {
    /// Creates a PLAIN mechanism with an empty authorization identity.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            started: false,
        }
    }
}

impl Mechanism for Plain {
    fn kind(&self) -> AuthMechanism {
        AuthMechanism::Plain
    }

    fn start(&mut self) -> Result<Option<Vec<u8>>> {
        if self.started {
            return Err(Error::Sasl("PLAIN already started".into()));
        }
        self.started = true;

        let mut message = Vec::with_capacity(self.username.len() + self.password.len() + 2);
        message.push(0);
        message.extend_from_slice(self.username.as_bytes());
        message.push(0);
        message.extend_from_slice(self.password.as_bytes());
        Ok(Some(message))
    }

    fn next(&mut self, _challenge: &[u8]) -> Result<Vec<u8>> {
        Err(Error::Sasl("PLAIN does not accept challenges".into()))
    }
}

impl fmt::Debug for Plain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plain")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginStep {
    Initial,
    AwaitingUsername,
    AwaitingPassword,
    Done,
}

/// LOGIN: the server prompts for the username, then the password.
pub struct Login {
    username: String,
    password: String,
    step: LoginStep,
}

impl Login {
    /// Creates a LOGIN mechanism.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            step: LoginStep::Initial,
        }
    }
}

impl Mechanism for Login {
    fn kind(&self) -> AuthMechanism {
        AuthMechanism::Login
    }

    fn start(&mut self) -> Result<Option<Vec<u8>>> {
        if self.step != LoginStep::Initial {
            return Err(Error::Sasl("LOGIN already started".into()));
        }
        self.step = LoginStep::AwaitingUsername;
        Ok(None)
    }

    // Prompt text ("Username:", "Password:") varies between servers and is
    // ignored; only the step count matters.
    fn next(&mut self, _challenge: &[u8]) -> Result<Vec<u8>> {
        match self.step {
            LoginStep::AwaitingUsername => {
                self.step = LoginStep::AwaitingPassword;
                Ok(self.username.as_bytes().to_vec())
            }
            LoginStep::AwaitingPassword => {
                self.step = LoginStep::Done;
                Ok(self.password.as_bytes().to_vec())
            }
            LoginStep::Initial | LoginStep::Done => {
                Err(Error::Sasl(format!("unexpected LOGIN challenge in {:?}", self.step)))
            }
        }
    }
}

impl fmt::Debug for Login {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Login")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("step", &self.step)
            .finish()
    }
}

/// `XOAUTH2`: `user=<addr>^Aauth=Bearer <token>^A^A` as the initial response.
///
/// The exchange has exactly one step. Servers report a rejected token with a
/// `334` carrying a JSON error document; [`Mechanism::next`] turns that into
/// [`Error::Sasl`] so the driver cancels and fails.
pub struct XOAuth2 {
    user: String,
    access_token: String,
    started: bool,
}

impl XOAuth2 {
    /// Creates an `XOAUTH2` mechanism for `user` with a bearer token.
    #[must_use]
    pub fn new(user: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            access_token: access_token.into(),
            started: false,
        }
    }
}

impl Mechanism for XOAuth2 {
    fn kind(&self) -> AuthMechanism {
        AuthMechanism::XOAuth2
    }

    fn start(&mut self) -> Result<Option<Vec<u8>>> {
        if self.started {
            return Err(Error::Sasl("XOAUTH2 already started".into()));
        }
        self.started = true;
        let message = format!(
            "user={}\x01auth=Bearer {}\x01\x01",
            self.user, self.access_token
        );
        Ok(Some(message.into_bytes()))
    }

    fn next(&mut self, challenge: &[u8]) -> Result<Vec<u8>> {
        let detail = String::from_utf8_lossy(challenge);
        Err(Error::Sasl(if self.started {
            format!("unexpected XOAUTH2 challenge: {detail}")
        } else {
            "XOAUTH2 challenge before initial response".to_string()
        }))
    }
}

impl fmt::Debug for XOAuth2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XOAuth2")
            .field("user", &self.user)
            .field("access_token", &"<redacted>")
            .field("started", &self.started)
            .finish()
    }
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

    #[test]
    fn plain_message() {
        let mut plain = Plain::new("user@example.com", "hunter2");
        assert_eq!(plain.kind(), AuthMechanism::Plain);
        assert_eq!(
            plain.start().unwrap().unwrap(),
            b"\0user@example.com\0hunter2".to_vec()
        );
        assert!(plain.start().is_err());
        assert!(plain.next(b"").is_err());
    }

    #[test]
    fn login_two_steps() {
        let mut login = Login::new("alice", "s3cret");
        assert_eq!(login.start().unwrap(), None);
        assert_eq!(login.next(b"Username:").unwrap(), b"alice".to_vec());
        assert_eq!(login.next(b"Password:").unwrap(), b"s3cret".to_vec());
        assert!(login.next(b"again?").is_err());
    }

    #[test]
    fn login_requires_start() {
        let mut login = Login::new("alice", "s3cret");
        assert!(login.next(b"Username:").is_err());
    }

    #[test]
    fn xoauth2_initial_response() {
        let mut mech = XOAuth2::new("someone@example.com", "ya29.token");
        let message = mech.start().unwrap().unwrap();
        assert_eq!(
            message,
            b"user=someone@example.com\x01auth=Bearer ya29.token\x01\x01".to_vec()
        );
    }

    #[test]
    fn xoauth2_rejects_challenge_after_start() {
        let mut mech = XOAuth2::new("someone@example.com", "expired");
        mech.start().unwrap();
        let err = mech.next(br#"{"status":"401"}"#).unwrap_err();
        assert!(matches!(err, Error::Sasl(ref msg) if msg.contains("401")));
        assert!(mech.start().is_err());
    }

    #[test]
    fn debug_redacts_secrets() {
        let plain = format!("{:?}", Plain::new("u", "topsecret"));
        let login = format!("{:?}", Login::new("u", "topsecret"));
        let xoauth = format!("{:?}", XOAuth2::new("u", "topsecret"));
        for rendered in [plain, login, xoauth] {
            assert!(!rendered.contains("topsecret"));
            assert!(rendered.contains("<redacted>"));
        }
    }
}
