//! Line wrapping for base64 body parts (RFC 2045 §6.8).
//!
//! Base64 output must be split into lines of at most 76 characters, each
//! terminated by CRLF. [`LineWrapper`] sits between a base64 encoder and the
//! final sink and enforces that rule no matter how the encoder chunks its
//! writes.

use std::io::{self, Write};

/// Maximum encoded line length, excluding the CRLF terminator.
pub const MAX_LINE_LENGTH: usize = 76;

const CRLF: &[u8] = b"\r\n";

/// Streaming writer that inserts CRLF after every 76 bytes.
///
/// The line position is tracked across calls to [`Write::write`], so the
/// output is identical whether the input arrives in one buffer or byte by
/// byte. Call [`LineWrapper::finish`] to terminate the last partial line.
///
/// # Example
///
/// ```
/// use std::io::Write;
/// use courier_mime::LineWrapper;
///
/// let mut wrapper = LineWrapper::new(Vec::new());
/// wrapper.write_all(&[b'A'; 80]).unwrap();
/// let out = wrapper.finish().unwrap();
/// assert_eq!(out.len(), 80 + 4);
/// ```
#[derive(Debug)]
pub struct LineWrapper<W: Write> {
    inner: W,
    line: [u8; MAX_LINE_LENGTH],
    used: usize,
}

impl<W: Write> LineWrapper<W> {
    /// Wraps a sink.
    pub const fn new(inner: W) -> Self {
        Self {
            inner,
            line: [0; MAX_LINE_LENGTH],
            used: 0,
        }
    }

    /// Returns the number of bytes buffered for the current line.
    #[must_use]
    pub const fn pending(&self) -> usize {
        self.used
    }

    /// Writes the remaining partial line plus CRLF and returns the sink.
    ///
    /// Nothing is written when the buffer is empty, so an input whose length
    /// is a multiple of 76 does not gain a trailing blank line.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink fails.
    pub fn finish(mut self) -> io::Result<W> {
        if self.used > 0 {
            self.emit_line()?;
        }
        self.inner.flush()?;
        Ok(self.inner)
    }

    fn emit_line(&mut self) -> io::Result<()> {
        self.inner.write_all(&self.line[..self.used])?;
        self.inner.write_all(CRLF)?;
        self.used = 0;
        Ok(())
    }
}

impl<W: Write> Write for LineWrapper<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut rest = buf;
        while !rest.is_empty() {
            let take = (MAX_LINE_LENGTH - self.used).min(rest.len());
            self.line[self.used..self.used + take].copy_from_slice(&rest[..take]);
            self.used += take;
            rest = &rest[take..];

            if self.used == MAX_LINE_LENGTH {
                self.emit_line()?;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        // Partial lines stay buffered until `finish`.
        self.inner.flush()
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
    use proptest::prelude::*;

    fn wrap_in_chunks(data: &[u8], chunk: usize) -> Vec<u8> {
        let mut wrapper = LineWrapper::new(Vec::new());
        for piece in data.chunks(chunk.max(1)) {
            wrapper.write_all(piece).unwrap();
        }
        wrapper.finish().unwrap()
    }

    fn lines(out: &[u8]) -> Vec<&[u8]> {
        let mut lines = Vec::new();
        let mut rest = out;
        while let Some(pos) = rest.windows(2).position(|w| w == CRLF) {
            lines.push(&rest[..pos]);
            rest = &rest[pos + 2..];
        }
        assert!(rest.is_empty(), "output must end with CRLF");
        lines
    }

    #[test]
    fn empty_input_writes_nothing() {
        assert!(wrap_in_chunks(b"", 10).is_empty());
    }

    #[test]
    fn short_input_is_one_line() {
        assert_eq!(wrap_in_chunks(b"abc", 10), b"abc\r\n");
    }

    #[test]
    fn exact_line_has_no_trailing_blank_line() {
        let data = [b'x'; MAX_LINE_LENGTH];
        let out = wrap_in_chunks(&data, MAX_LINE_LENGTH);
        assert_eq!(out.len(), MAX_LINE_LENGTH + 2);
        assert!(out.ends_with(b"x\r\n"));
    }

    #[test]
    fn position_carries_across_writes() {
        let mut wrapper = LineWrapper::new(Vec::new());
        wrapper.write_all(&[b'a'; 50]).unwrap();
        assert_eq!(wrapper.pending(), 50);
        wrapper.write_all(&[b'b'; 50]).unwrap();
        assert_eq!(wrapper.pending(), 24);
        let out = wrapper.finish().unwrap();

        let lines = lines(&out);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), 76);
        assert_eq!(lines[1], &[b'b'; 24][..]);
    }

    #[test]
    fn sink_error_propagates() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::Error::other("sink closed"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut wrapper = LineWrapper::new(Broken);
        assert!(wrapper.write_all(&[0; 10]).is_ok());
        assert!(wrapper.write_all(&[0; 100]).is_err());
    }

    proptest! {
        #[test]
        fn wraps_into_ceil_lines(data in proptest::collection::vec(any::<u8>().prop_filter("no CR", |b| *b != b'\r'), 0..1000), chunk in 1usize..200) {
            let out = wrap_in_chunks(&data, chunk);
            let lines = lines(&out);

            prop_assert_eq!(lines.len(), data.len().div_ceil(MAX_LINE_LENGTH));
            prop_assert!(lines.iter().all(|l| l.len() <= MAX_LINE_LENGTH));
            prop_assert_eq!(lines.concat(), data);
        }

        #[test]
        fn chunking_does_not_change_output(data in proptest::collection::vec(any::<u8>(), 0..500), chunk in 1usize..100) {
            prop_assert_eq!(wrap_in_chunks(&data, chunk), wrap_in_chunks(&data, data.len().max(1)));
        }
    }
}
