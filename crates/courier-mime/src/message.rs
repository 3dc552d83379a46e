//! Outgoing message descriptor.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A file attached to an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Attachment {
    /// Path of the file on disk.
    pub path: PathBuf,
    /// Name shown to the recipient.
    pub filename: String,
}

impl Attachment {
    /// Creates an attachment descriptor.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, filename: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            filename: filename.into(),
        }
    }
}

/// An email to be rendered by [`MessageBuilder`](crate::MessageBuilder) and
/// sent in a single SMTP envelope.
///
/// Subject and HTML body are mandatory; everything else is optional. Bcc
/// addresses only ever reach the envelope, never the rendered headers.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EmailMessage {
    subject: String,
    html_body: String,
    from: String,
    to: String,
    #[cfg_attr(feature = "serde", serde(default))]
    reply_to: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    cc: Vec<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    bcc: Vec<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    attachment: Option<Attachment>,
    #[cfg_attr(feature = "serde", serde(default))]
    headers: BTreeMap<String, String>,
}

impl EmailMessage {
    /// Creates a message with the required fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyField`] if the subject or body is blank.
    pub fn new(
        subject: impl Into<String>,
        html_body: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Result<Self> {
        let message = Self {
            subject: subject.into(),
            html_body: html_body.into(),
            from: from.into(),
            to: to.into(),
            reply_to: None,
            cc: Vec::new(),
            bcc: Vec::new(),
            attachment: None,
            headers: BTreeMap::new(),
        };
        message.validate()?;
        Ok(message)
    }

    /// Checks the required fields.
    ///
    /// Deserialized messages bypass [`EmailMessage::new`], so the sender
    /// calls this again before rendering.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyField`] naming the first blank required field.
    pub fn validate(&self) -> Result<()> {
        if self.subject.trim().is_empty() {
            return Err(Error::EmptyField("subject"));
        }
        if self.html_body.trim().is_empty() {
            return Err(Error::EmptyField("body"));
        }
        if self.from.trim().is_empty() {
            return Err(Error::EmptyField("from"));
        }
        if self.to.trim().is_empty() {
            return Err(Error::EmptyField("to"));
        }
        Ok(())
    }

    /// Adds a CC recipient.
    #[must_use]
    pub fn with_cc(mut self, address: impl Into<String>) -> Self {
        self.cc.push(address.into());
        self
    }

    /// Adds a BCC recipient.
    #[must_use]
    pub fn with_bcc(mut self, address: impl Into<String>) -> Self {
        self.bcc.push(address.into());
        self
    }

    /// Sets the Reply-To address.
    #[must_use]
    pub fn with_reply_to(mut self, address: impl Into<String>) -> Self {
        self.reply_to = Some(address.into());
        self
    }

    /// Attaches a file.
    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    /// Adds an extra header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Subject line.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// HTML body.
    #[must_use]
    pub fn html_body(&self) -> &str {
        &self.html_body
    }

    /// Sender address.
    #[must_use]
    pub fn from(&self) -> &str {
        &self.from
    }

    /// Primary recipient.
    #[must_use]
    pub fn to(&self) -> &str {
        &self.to
    }

    /// Reply-To address.
    #[must_use]
    pub fn reply_to(&self) -> Option<&str> {
        self.reply_to.as_deref()
    }

    /// CC recipients.
    #[must_use]
    pub fn cc(&self) -> &[String] {
        &self.cc
    }

    /// BCC recipients.
    #[must_use]
    pub fn bcc(&self) -> &[String] {
        &self.bcc
    }

    /// Attachment, if any.
    #[must_use]
    pub const fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    /// Extra headers in name order.
    #[must_use]
    pub const fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Envelope recipients: `to`, then each cc, then each bcc.
    pub fn recipients(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.to.as_str())
            .chain(self.cc.iter().map(String::as_str))
            .chain(self.bcc.iter().map(String::as_str))
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
    fn requires_subject() {
        let err = EmailMessage::new("", "<p>x</p>", "a@x.com", "b@y.com").unwrap_err();
        assert!(matches!(err, Error::EmptyField("subject")));
    }

    #[test]
    fn requires_body() {
        let err = EmailMessage::new("Hi", "  ", "a@x.com", "b@y.com").unwrap_err();
        assert!(matches!(err, Error::EmptyField("body")));
    }

    #[test]
    fn recipients_in_envelope_order() {
        let message = EmailMessage::new("Hi", "<p>x</p>", "a@x.com", "to@y.com")
            .unwrap()
            .with_cc("cc1@y.com")
            .with_bcc("bcc@y.com")
            .with_cc("cc2@y.com");

        let recipients: Vec<&str> = message.recipients().collect();
        assert_eq!(recipients, vec!["to@y.com", "cc1@y.com", "cc2@y.com", "bcc@y.com"]);
    }

    #[test]
    fn optional_fields() {
        let message = EmailMessage::new("Hi", "<p>x</p>", "a@x.com", "b@y.com")
            .unwrap()
            .with_reply_to("r@x.com")
            .with_header("X-Campaign", "42")
            .with_attachment(Attachment::new("/tmp/report.pdf", "report.pdf"));

        assert_eq!(message.reply_to(), Some("r@x.com"));
        assert_eq!(message.headers().get("X-Campaign").map(String::as_str), Some("42"));
        assert_eq!(message.attachment().unwrap().filename, "report.pdf");
    }
}
