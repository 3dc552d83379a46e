//! SMTP reply types.

use crate::error::{Error, Result};

/// SMTP reply from server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply code (e.g., 250).
    pub code: ReplyCode,
    /// Reply text, one entry per line.
    pub lines: Vec<String>,
}

impl Reply {
    /// Creates a new reply.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Vec is not const-compatible
    pub fn new(code: ReplyCode, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// Returns true if this is a completion reply (2xx).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// Returns the full text as a single string.
    #[must_use]
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Converts a non-2xx reply into [`Error::SmtpError`].
    ///
    /// # Errors
    ///
    /// Returns the reply as an error unless it is a 2xx completion.
    pub fn into_success(self) -> Result<Self> {
        self.expect(ReplyCode::is_success)
    }

    /// Converts a reply that is not exactly `code` into an error.
    ///
    /// # Errors
    ///
    /// Returns the reply as an error unless its code matches.
    pub fn expect_code(self, code: ReplyCode) -> Result<Self> {
        self.expect(|c| c == code)
    }

    fn expect(self, accept: impl FnOnce(ReplyCode) -> bool) -> Result<Self> {
        if accept(self.code) {
            Ok(self)
        } else {
            Err(Error::smtp_error(self.code.as_u16(), self.text()))
        }
    }
}

/// SMTP reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// 220 Service ready
    pub const SERVICE_READY: Self = Self(220);
    /// 221 Service closing transmission channel
    pub const CLOSING: Self = Self(221);
    /// 235 Authentication succeeded
    pub const AUTH_SUCCESS: Self = Self(235);
    /// 250 Requested mail action okay, completed
    pub const OK: Self = Self(250);
    /// 334 Server challenge
    pub const AUTH_CONTINUE: Self = Self(334);
    /// 354 Start mail input
    pub const START_DATA: Self = Self(354);
    /// 421 Service not available, closing transmission channel
    pub const SERVICE_UNAVAILABLE: Self = Self(421);
    /// 451 Local error in processing
    pub const LOCAL_ERROR: Self = Self(451);
    /// 501 Syntax error in parameters or arguments
    pub const PARAMETER_ERROR: Self = Self(501);
    /// 535 Authentication credentials invalid
    pub const AUTH_FAILED: Self = Self(535);
    /// 550 Mailbox unavailable
    pub const MAILBOX_UNAVAILABLE: Self = Self(550);

    /// Creates a new reply code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// First-digit class, or `None` for codes outside 200..=599.
    #[must_use]
    pub const fn class(self) -> Option<ReplyClass> {
        match self.0 / 100 {
            2 => Some(ReplyClass::Completion),
            3 => Some(ReplyClass::Intermediate),
            4 => Some(ReplyClass::Transient),
            5 => Some(ReplyClass::Permanent),
            _ => None,
        }
    }

    /// True for 2xx.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self.class(), Some(ReplyClass::Completion))
    }
}

/// RFC 5321 §4.2.1 reply classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyClass {
    /// 2yz: the command succeeded.
    Completion,
    /// 3yz: more input is expected (DATA, AUTH challenges).
    Intermediate,
    /// 4yz: failed, may succeed later.
    Transient,
    /// 5yz: failed for good.
    Permanent,
}

impl std::fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn reply(code: u16, text: &str) -> Reply {
        Reply::new(ReplyCode::new(code), vec![text.to_string()])
    }

    #[test]
    fn code_classes() {
        assert!(ReplyCode::OK.is_success());
        assert!(ReplyCode::AUTH_SUCCESS.is_success());
        assert_eq!(ReplyCode::START_DATA.class(), Some(ReplyClass::Intermediate));
        assert_eq!(ReplyCode::AUTH_CONTINUE.class(), Some(ReplyClass::Intermediate));
        assert_eq!(ReplyCode::LOCAL_ERROR.class(), Some(ReplyClass::Transient));
        assert_eq!(ReplyCode::AUTH_FAILED.class(), Some(ReplyClass::Permanent));
        assert!(!ReplyCode::MAILBOX_UNAVAILABLE.is_success());
        assert_eq!(ReplyCode::new(199).class(), None);
        assert_eq!(ReplyCode::new(600).class(), None);
    }

    #[test]
    fn into_success_passes_2xx() {
        let ok = reply(250, "OK").into_success().unwrap();
        assert_eq!(ok.text(), "OK");
    }

    #[test]
    fn into_success_rejects_others() {
        let err = reply(550, "No such user").into_success().unwrap_err();
        assert!(matches!(err, Error::SmtpError { code: 550, ref message } if message == "No such user"));

        // 354 is not a completion
        assert!(reply(354, "go ahead").into_success().is_err());
    }

    #[test]
    fn expect_code_is_exact() {
        assert!(reply(354, "go").expect_code(ReplyCode::START_DATA).is_ok());
        assert!(reply(250, "ok").expect_code(ReplyCode::START_DATA).is_err());
    }

    #[test]
    fn multi_line_text() {
        let reply = Reply::new(
            ReplyCode::OK,
            vec!["mx.example.com".to_string(), "PIPELINING".to_string()],
        );
        assert_eq!(reply.text(), "mx.example.com\nPIPELINING");
        assert_eq!(format!("{}", reply.code), "250");
    }
}
