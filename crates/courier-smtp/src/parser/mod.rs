//! SMTP reply parser.

use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};

/// Parses an SMTP reply from its response lines (CRLF already stripped).
///
/// SMTP replies can be single-line or multi-line:
/// - Single: `250 OK`
/// - Multi: `250-First line`, `250-Second line`, `250 Last line`
///
/// # Errors
///
/// Returns an error if a line is malformed or the lines disagree on the code.
pub fn parse_reply(lines: &[String]) -> Result<Reply> {
    let Some(first) = lines.first() else {
        return Err(Error::Protocol("empty reply".into()));
    };
    let code = parse_code(first)?;

    let mut text = Vec::with_capacity(lines.len());
    for line in lines {
        if parse_code(line)? != code {
            return Err(Error::Protocol(format!(
                "reply code changed mid-reply: {line:?}"
            )));
        }
        match line.len() {
            3 => text.push(String::new()),
            _ if matches!(line.as_bytes()[3], b' ' | b'-') => text.push(line[4..].to_string()),
            _ => return Err(Error::Protocol(format!("malformed reply line: {line:?}"))),
        }
    }

    Ok(Reply::new(ReplyCode::new(code), text))
}

fn parse_code(line: &str) -> Result<u16> {
    line.get(..3)
        .filter(|code| code.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| Error::Protocol(format!("invalid reply code in {line:?}")))
}

/// Returns true if the line ends a reply.
///
/// Continuation lines use `-` after the code; the last line uses a space or
/// carries no text at all.
#[must_use]
pub fn is_last_reply_line(line: &str) -> bool {
    line.len() == 3 || (line.len() >= 4 && line.as_bytes()[3] == b' ')
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

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn single_line() {
        let reply = parse_reply(&lines(&["250 OK"])).unwrap();
        assert_eq!(reply.code, ReplyCode::OK);
        assert_eq!(reply.lines, vec!["OK"]);
    }

    #[test]
    fn multi_line_ehlo() {
        let reply = parse_reply(&lines(&[
            "250-mx.example.com greets you",
            "250-AUTH PLAIN XOAUTH2",
            "250 STARTTLS",
        ]))
        .unwrap();
        assert_eq!(reply.code.as_u16(), 250);
        assert_eq!(
            reply.lines,
            vec!["mx.example.com greets you", "AUTH PLAIN XOAUTH2", "STARTTLS"]
        );
    }

    #[test]
    fn bare_code() {
        let reply = parse_reply(&lines(&["334"])).unwrap();
        assert_eq!(reply.code, ReplyCode::AUTH_CONTINUE);
        assert_eq!(reply.lines, vec![""]);
    }

    #[test]
    fn last_line_detection() {
        assert!(is_last_reply_line("250 OK"));
        assert!(is_last_reply_line("334"));
        assert!(!is_last_reply_line("250-Continuing"));
    }

    #[test]
    fn rejects_malformed() {
        assert!(parse_reply(&[]).is_err());
        assert!(parse_reply(&lines(&["25"])).is_err());
        assert!(parse_reply(&lines(&["ABC OK"])).is_err());
        assert!(parse_reply(&lines(&["250xOK"])).is_err());
    }

    #[test]
    fn rejects_mixed_codes() {
        let err = parse_reply(&lines(&["250-first", "550 second"])).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }
}
