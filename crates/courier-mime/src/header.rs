//! Ordered header blocks.

use crate::error::{Error, Result};
use std::fmt;

/// An ordered collection of header fields.
///
/// Unlike a parsed header map, an outgoing header block keeps insertion order
/// and holds each name at most once; [`Headers::set`] replaces a value in
/// place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: Vec<(String, String)>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a header, replacing any existing value with the same name
    /// (case-insensitive) while keeping its position.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is not a valid field name or the value
    /// contains CR or LF.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let name = name.into();
        let value = value.into();
        validate(&name, &value)?;

        match self
            .fields
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
        Ok(())
    }

    /// Gets a header value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns true if the header is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if there are no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns an iterator over fields in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

fn validate(name: &str, value: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_header(name, "empty field name"));
    }
    // RFC 5322 §2.2: printable US-ASCII except colon.
    if !name.bytes().all(|b| (33..=126).contains(&b) && b != b':') {
        return Err(Error::invalid_header(name, "invalid character in field name"));
    }
    if value.contains(['\r', '\n']) {
        return Err(Error::invalid_header(name, "line break in field value"));
    }
    Ok(())
}

impl fmt::Display for Headers {
    /// Writes each field as `Name: value\r\n`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.fields {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
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
    fn keeps_insertion_order() {
        let mut headers = Headers::new();
        headers.set("Subject", "Hi").unwrap();
        headers.set("From", "a@x.com").unwrap();
        headers.set("To", "b@y.com").unwrap();

        let names: Vec<&str> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Subject", "From", "To"]);
    }

    #[test]
    fn set_replaces_in_place() {
        let mut headers = Headers::new();
        headers.set("Subject", "first").unwrap();
        headers.set("From", "a@x.com").unwrap();
        headers.set("subject", "second").unwrap();

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("SUBJECT"), Some("second"));
        assert_eq!(headers.iter().next(), Some(("Subject", "second")));
    }

    #[test]
    fn rejects_line_breaks() {
        let mut headers = Headers::new();
        let err = headers.set("Subject", "hi\r\nBcc: evil@x.com").unwrap_err();
        assert!(matches!(err, Error::InvalidHeader { .. }));
        assert!(headers.is_empty());
    }

    #[test]
    fn rejects_bad_names() {
        let mut headers = Headers::new();
        assert!(headers.set("", "x").is_err());
        assert!(headers.set("X Bad", "x").is_err());
        assert!(headers.set("X:Bad", "x").is_err());
        assert!(headers.set("X-Good", "x").is_ok());
    }

    #[test]
    fn display_uses_crlf() {
        let mut headers = Headers::new();
        headers.set("MIME-Version", "1.0").unwrap();
        headers.set("Subject", "Test").unwrap();
        assert_eq!(headers.to_string(), "MIME-Version: 1.0\r\nSubject: Test\r\n");
    }
}
