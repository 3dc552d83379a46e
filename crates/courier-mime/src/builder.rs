//! `multipart/mixed` message rendering.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, Write};

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{debug, warn};

use crate::content_type::ContentType;
use crate::encoding::{copy_base64_wrapped, encode_header_value};
use crate::error::Result;
use crate::header::Headers;
use crate::message::{Attachment, EmailMessage};

/// Header names the builder owns; extra headers cannot override them.
const RESERVED_HEADERS: &[&str] = &[
    "MIME-Version",
    "Content-Type",
    "Content-Transfer-Encoding",
    "Date",
    "Subject",
    "From",
    "To",
    "Cc",
    "Reply-To",
    "Bcc",
];

/// Number of random bytes in a generated boundary.
const BOUNDARY_BYTES: usize = 30;

/// Renders an [`EmailMessage`] into the bytes sent after SMTP `DATA`.
///
/// The output is a `multipart/mixed` message with one `text/html` part and,
/// when the attachment file can be opened, one base64 attachment part.
///
/// ```
/// use courier_mime::{EmailMessage, MessageBuilder};
///
/// let message = EmailMessage::new("Test", "<h1>Hi</h1>", "a@x.com", "b@y.com").unwrap();
/// let bytes = MessageBuilder::new(&message).build().unwrap();
/// assert!(bytes.starts_with(b"MIME-Version: 1.0\r\n"));
/// ```
#[derive(Debug, Clone)]
pub struct MessageBuilder<'a> {
    message: &'a EmailMessage,
    boundary: Option<String>,
    date: Option<DateTime<Utc>>,
}

impl<'a> MessageBuilder<'a> {
    /// Creates a builder for `message`.
    #[must_use]
    pub const fn new(message: &'a EmailMessage) -> Self {
        Self {
            message,
            boundary: None,
            date: None,
        }
    }

    /// Uses a fixed boundary instead of a random one.
    #[must_use]
    pub fn with_boundary(mut self, boundary: impl Into<String>) -> Self {
        self.boundary = Some(boundary.into());
        self
    }

    /// Uses a fixed `Date` header instead of the current time.
    #[must_use]
    pub const fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    /// Renders the message.
    ///
    /// # Errors
    ///
    /// Returns an error if a header value is invalid or reading the
    /// attachment fails midway.
    pub fn build(&self) -> Result<Vec<u8>> {
        let boundary = self.boundary.clone().unwrap_or_else(generate_boundary);

        let mut out = Vec::with_capacity(self.message.html_body().len() + 1024);
        out.extend_from_slice(self.header_block(&boundary)?.to_string().as_bytes());
        out.extend_from_slice(b"\r\n");

        let mut parts = MultipartWriter::new(&mut out, &boundary);

        let mut html = Headers::new();
        html.set("Content-Type", ContentType::text_html().to_string())?;
        parts
            .create_part(&html)?
            .write_all(self.message.html_body().as_bytes())?;

        if let Some(attachment) = self.message.attachment() {
            write_attachment(&mut parts, attachment)?;
        }

        parts.close()?;
        Ok(out)
    }

    fn header_block(&self, boundary: &str) -> Result<Headers> {
        let message = self.message;
        let date = self.date.unwrap_or_else(Utc::now);

        let mut headers = Headers::new();
        headers.set("MIME-Version", "1.0")?;
        headers.set("Content-Type", ContentType::multipart_mixed(boundary).to_string())?;
        headers.set("Content-Transfer-Encoding", "base64")?;
        headers.set("Date", date.to_rfc2822())?;
        headers.set("Subject", encode_header_value(message.subject()))?;
        headers.set("From", message.from())?;
        headers.set("To", message.to())?;
        if !message.cc().is_empty() {
            headers.set("Cc", message.cc().join(", "))?;
        }
        if let Some(reply_to) = message.reply_to() {
            headers.set("Reply-To", reply_to)?;
        }

        for (name, value) in message.headers() {
            if RESERVED_HEADERS.iter().any(|r| r.eq_ignore_ascii_case(name)) {
                debug!(header = %name, "Ignoring extra header that shadows a standard header");
                continue;
            }
            headers.set(name.as_str(), value.as_str())?;
        }

        Ok(headers)
    }
}

fn write_attachment<W: Write>(parts: &mut MultipartWriter<W>, attachment: &Attachment) -> Result<()> {
    let file = File::open(&attachment.path).and_then(|file| {
        if file.metadata()?.is_file() {
            Ok(file)
        } else {
            Err(io::Error::other("not a regular file"))
        }
    });

    let mut file = match file {
        Ok(file) => file,
        Err(e) => {
            warn!(
                path = %attachment.path.display(),
                error = %e,
                "Attachment is not readable, sending without it"
            );
            return Ok(());
        }
    };

    let filename = escape_quoted(&attachment.filename);
    let mut headers = Headers::new();
    headers.set(
        "Content-Type",
        format!("{}; name=\"{filename}\"", ContentType::from_path(&attachment.path)),
    )?;
    headers.set("Content-Transfer-Encoding", "base64")?;
    headers.set(
        "Content-Disposition",
        format!("attachment; filename=\"{filename}\""),
    )?;

    let copied = copy_base64_wrapped(&mut file, parts.create_part(&headers)?)?;
    debug!(filename = %attachment.filename, bytes = copied, "Attached file");
    Ok(())
}

fn escape_quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn generate_boundary() -> String {
    let bytes: [u8; BOUNDARY_BYTES] = rand::thread_rng().r#gen();
    bytes.iter().fold(String::with_capacity(BOUNDARY_BYTES * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

/// Writes boundary-delimited body parts.
struct MultipartWriter<W: Write> {
    inner: W,
    boundary: String,
    parts: usize,
}

impl<W: Write> MultipartWriter<W> {
    fn new(inner: W, boundary: &str) -> Self {
        Self {
            inner,
            boundary: boundary.to_string(),
            parts: 0,
        }
    }

    /// Starts a new part and returns the sink for its body.
    fn create_part(&mut self, headers: &Headers) -> io::Result<&mut W> {
        if self.parts == 0 {
            write!(self.inner, "--{}\r\n", self.boundary)?;
        } else {
            write!(self.inner, "\r\n--{}\r\n", self.boundary)?;
        }
        write!(self.inner, "{headers}\r\n")?;
        self.parts += 1;
        Ok(&mut self.inner)
    }

    /// Writes the closing delimiter.
    fn close(mut self) -> io::Result<W> {
        write!(self.inner, "\r\n--{}--\r\n", self.boundary)?;
        Ok(self.inner)
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
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use chrono::TimeZone;
    use std::path::PathBuf;

    fn render(message: &EmailMessage) -> String {
        let date = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let bytes = MessageBuilder::new(message)
            .with_boundary("BOUNDARY")
            .with_date(date)
            .build()
            .unwrap();
        String::from_utf8(bytes).unwrap()
    }

    fn header_block(rendered: &str) -> &str {
        rendered.split("\r\n\r\n").next().unwrap()
    }

    fn temp_file(name: &str, contents: &[u8]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("courier-mime-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn renders_headers_in_fixed_order() {
        let message = EmailMessage::new("Test", "<h1>Hi</h1>", "a@x.com", "b@y.com")
            .unwrap()
            .with_cc("c@y.com")
            .with_cc("d@y.com")
            .with_reply_to("r@x.com");

        let rendered = render(&message);
        let lines: Vec<&str> = header_block(&rendered).split("\r\n").collect();
        assert_eq!(
            lines,
            vec![
                "MIME-Version: 1.0",
                "Content-Type: multipart/mixed; boundary=BOUNDARY",
                "Content-Transfer-Encoding: base64",
                "Date: Fri, 1 Mar 2024 12:00:00 +0000",
                "Subject: Test",
                "From: a@x.com",
                "To: b@y.com",
                "Cc: c@y.com, d@y.com",
                "Reply-To: r@x.com",
            ]
        );
    }

    #[test]
    fn single_html_part_without_attachment() {
        let message = EmailMessage::new("Test", "<h1>Hi</h1>", "a@x.com", "b@y.com").unwrap();
        let rendered = render(&message);

        let body = rendered.split_once("\r\n\r\n").unwrap().1;
        assert_eq!(
            body,
            "--BOUNDARY\r\n\
             Content-Type: text/html; charset=UTF-8\r\n\
             \r\n\
             <h1>Hi</h1>\r\n\
             --BOUNDARY--\r\n"
        );
        assert_eq!(rendered.matches("Subject:").count(), 1);
        assert_eq!(rendered.matches("From:").count(), 1);
        assert_eq!(rendered.matches("To:").count(), 1);
        assert!(!rendered.contains("Cc:"));
    }

    #[test]
    fn bcc_never_rendered() {
        let message = EmailMessage::new("Test", "<p>x</p>", "a@x.com", "b@y.com")
            .unwrap()
            .with_bcc("hidden@y.com")
            .with_header("Bcc", "hidden@y.com");
        let rendered = render(&message);
        assert!(!rendered.contains("hidden@y.com"));
    }

    #[test]
    fn extra_headers_follow_standard_ones() {
        let message = EmailMessage::new("Test", "<p>x</p>", "a@x.com", "b@y.com")
            .unwrap()
            .with_header("X-Priority", "1")
            .with_header("Subject", "Override")
            .with_header("List-Unsubscribe", "<mailto:u@x.com>");
        let rendered = render(&message);
        let block = header_block(&rendered);

        assert!(block.ends_with("To: b@y.com\r\nList-Unsubscribe: <mailto:u@x.com>\r\nX-Priority: 1"));
        assert_eq!(block.matches("Subject:").count(), 1);
        assert!(block.contains("Subject: Test"));
    }

    #[test]
    fn header_injection_is_rejected() {
        let message = EmailMessage::new("Hi", "<p>x</p>", "a@x.com\r\nBcc: x@y.com", "b@y.com").unwrap();
        assert!(MessageBuilder::new(&message).build().is_err());
    }

    #[test]
    fn non_ascii_subject_is_encoded() {
        let message = EmailMessage::new("Grüße", "<p>x</p>", "a@x.com", "b@y.com").unwrap();
        let rendered = render(&message);
        assert!(rendered.contains("Subject: =?utf-8?B?R3LDvMOfZQ==?="));
    }

    #[test]
    fn attachment_is_base64_wrapped() {
        let contents: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let path = temp_file("report.pdf", &contents);
        let message = EmailMessage::new("Test", "<p>x</p>", "a@x.com", "b@y.com")
            .unwrap()
            .with_attachment(Attachment::new(&path, "Q1 report.pdf"));

        let rendered = render(&message);
        let attachment = rendered
            .split("--BOUNDARY\r\n")
            .nth(2)
            .unwrap()
            .trim_end_matches("\r\n--BOUNDARY--\r\n");
        let (headers, body) = attachment.split_once("\r\n\r\n").unwrap();

        assert_eq!(
            headers,
            "Content-Type: application/pdf; name=\"Q1 report.pdf\"\r\n\
             Content-Transfer-Encoding: base64\r\n\
             Content-Disposition: attachment; filename=\"Q1 report.pdf\""
        );
        assert!(body.split_terminator("\r\n").all(|l| l.len() <= 76));
        let joined: String = body.split("\r\n").collect();
        assert_eq!(STANDARD.decode(joined).unwrap(), contents);
    }

    #[test]
    fn unknown_extension_is_octet_stream() {
        let path = temp_file("data.zzunknown", b"payload");
        let message = EmailMessage::new("Test", "<p>x</p>", "a@x.com", "b@y.com")
            .unwrap()
            .with_attachment(Attachment::new(&path, "data.zzunknown"));
        let rendered = render(&message);
        assert!(rendered.contains("Content-Type: application/octet-stream; name=\"data.zzunknown\"\r\n"));
    }

    #[test]
    fn quotes_in_attachment_name_are_escaped() {
        let path = temp_file("notes.txt", b"hi");
        let message = EmailMessage::new("Test", "<p>x</p>", "a@x.com", "b@y.com")
            .unwrap()
            .with_attachment(Attachment::new(&path, "say \"hi\".txt"));
        let rendered = render(&message);
        assert!(rendered.contains("Content-Type: text/plain; name=\"say \\\"hi\\\".txt\"\r\n"));
        assert!(rendered.contains("Content-Disposition: attachment; filename=\"say \\\"hi\\\".txt\""));
    }

    #[test]
    fn unreadable_attachment_is_skipped() {
        let message = EmailMessage::new("Test", "<p>x</p>", "a@x.com", "b@y.com")
            .unwrap()
            .with_attachment(Attachment::new("/nonexistent/courier/file.pdf", "file.pdf"));
        let rendered = render(&message);
        assert!(!rendered.contains("Content-Disposition"));
        assert_eq!(rendered.matches("--BOUNDARY\r\n").count(), 1);
        assert!(rendered.ends_with("\r\n--BOUNDARY--\r\n"));
    }

    #[test]
    fn generated_boundaries_are_random() {
        let a = generate_boundary();
        let b = generate_boundary();
        assert_eq!(a.len(), BOUNDARY_BYTES * 2);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
