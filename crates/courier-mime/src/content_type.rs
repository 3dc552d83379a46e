//! MIME content type handling.

use std::fmt;
use std::path::Path;

/// MIME content type with ordered parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Main type (e.g., "text", "application", "multipart").
    pub main_type: String,
    /// Subtype (e.g., "html", "pdf", "mixed").
    pub sub_type: String,
    /// Parameters in emission order (e.g., charset, boundary).
    pub parameters: Vec<(String, String)>,
}

impl ContentType {
    /// Creates a new content type without parameters.
    #[must_use]
    pub fn new(main_type: impl Into<String>, sub_type: impl Into<String>) -> Self {
        Self {
            main_type: main_type.into(),
            sub_type: sub_type.into(),
            parameters: Vec::new(),
        }
    }

    /// `text/html; charset=UTF-8`.
    #[must_use]
    pub fn text_html() -> Self {
        Self::new("text", "html").with_parameter("charset", "UTF-8")
    }

    /// `multipart/mixed; boundary=<boundary>`.
    #[must_use]
    pub fn multipart_mixed(boundary: impl Into<String>) -> Self {
        Self::new("multipart", "mixed").with_parameter("boundary", boundary)
    }

    /// Guesses the content type of a file from its extension.
    ///
    /// Unknown extensions fall back to `application/octet-stream`.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        let guess = mime_guess::from_path(path).first_or_octet_stream();
        Self::new(guess.type_().as_str(), guess.subtype().as_str())
    }

    /// Adds a parameter, replacing an existing one with the same name.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into().to_lowercase();
        let value = value.into();
        match self.parameters.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.parameters.push((key, value)),
        }
        self
    }

    /// Returns a parameter value by name.
    #[must_use]
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the boundary parameter if present.
    #[must_use]
    pub fn boundary(&self) -> Option<&str> {
        self.parameter("boundary")
    }

    /// Returns the `type/subtype` essence without parameters.
    #[must_use]
    pub fn essence(&self) -> String {
        format!("{}/{}", self.main_type, self.sub_type)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.main_type, self.sub_type)?;
        for (key, value) in &self.parameters {
            if value.contains(|c: char| c.is_whitespace() || "()<>@,;:\\\"/[]?=".contains(c)) {
                write!(f, "; {key}=\"{value}\"")?;
            } else {
                write!(f, "; {key}={value}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn html_display() {
        assert_eq!(ContentType::text_html().to_string(), "text/html; charset=UTF-8");
    }

    #[test]
    fn multipart_boundary() {
        let ct = ContentType::multipart_mixed("abc123");
        assert_eq!(ct.to_string(), "multipart/mixed; boundary=abc123");
        assert_eq!(ct.boundary(), Some("abc123"));
    }

    #[test]
    fn guesses_from_extension() {
        assert_eq!(ContentType::from_path(Path::new("report.pdf")).essence(), "application/pdf");
        assert_eq!(ContentType::from_path(Path::new("logo.PNG")).essence(), "image/png");
    }

    #[test]
    fn unknown_extension_is_octet_stream() {
        assert_eq!(
            ContentType::from_path(Path::new("blob.zzunknown")).essence(),
            "application/octet-stream"
        );
        assert_eq!(
            ContentType::from_path(Path::new("no_extension")).essence(),
            "application/octet-stream"
        );
    }

    #[test]
    fn with_parameter_replaces() {
        let ct = ContentType::new("text", "plain")
            .with_parameter("charset", "us-ascii")
            .with_parameter("Charset", "utf-8");
        assert_eq!(ct.parameters.len(), 1);
        assert_eq!(ct.parameter("charset"), Some("utf-8"));
    }
}
