//! Header and body encoding helpers.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::io::{self, Read, Write};

use crate::wrap::LineWrapper;

/// Encodes data as Base64 without line breaks.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Streams `reader` through a base64 encoder into `sink`, wrapping lines at
/// 76 characters with CRLF terminators.
///
/// Returns the number of raw bytes consumed from the reader.
///
/// # Errors
///
/// Returns an error if reading the source or writing the sink fails.
pub fn copy_base64_wrapped<R: Read, W: Write>(reader: &mut R, sink: W) -> io::Result<u64> {
    let mut encoder = base64::write::EncoderWriter::new(LineWrapper::new(sink), &STANDARD);
    let copied = io::copy(reader, &mut encoder)?;
    let wrapper = encoder.finish()?;
    wrapper.finish()?;
    Ok(copied)
}

/// Encodes a header value as an RFC 2047 encoded-word when it is not plain
/// ASCII.
///
/// Format: `=?utf-8?B?<base64>?=`
#[must_use]
pub fn encode_header_value(text: &str) -> String {
    if text.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) && !text.contains("=?") {
        return text.to_string();
    }
    format!("=?utf-8?B?{}?=", encode_base64(text.as_bytes()))
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
    fn base64_plain() {
        assert_eq!(encode_base64(b"Hello, World!"), "SGVsbG8sIFdvcmxkIQ==");
    }

    #[test]
    fn wrapped_base64_has_short_lines() {
        let data = vec![0xAB_u8; 300];
        let mut out = Vec::new();
        let copied = copy_base64_wrapped(&mut data.as_slice(), &mut out).unwrap();
        assert_eq!(copied, 300);

        let text = String::from_utf8(out).unwrap();
        assert!(text.ends_with("\r\n"));
        for line in text.split_terminator("\r\n") {
            assert!(line.len() <= 76);
        }

        let joined: String = text.split("\r\n").collect();
        assert_eq!(STANDARD.decode(joined).unwrap(), data);
    }

    #[test]
    fn ascii_header_untouched() {
        assert_eq!(encode_header_value("Weekly report"), "Weekly report");
    }

    #[test]
    fn non_ascii_header_encoded() {
        let encoded = encode_header_value("Héllo");
        assert_eq!(encoded, "=?utf-8?B?SMOpbGxv?=");
    }

    #[test]
    fn encoded_word_lookalike_is_encoded() {
        assert!(encode_header_value("=?x?B?abc?=").starts_with("=?utf-8?B?"));
    }
}
