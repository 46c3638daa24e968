// Text frame parser for the minimal STOMP profile: header block up to the
// first blank line, body up to the first NUL. No escaping, no content-length.
use thiserror::Error;

use crate::frame::Frame;

/// Errors produced while decoding an inbound payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The payload has no `"\n\n"` separating headers from the body.
    #[error("missing blank line between headers and body")]
    MissingDivider,
    /// A header line has no `:` separator.
    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),
    /// The payload bytes are not valid UTF-8.
    #[error("invalid utf8 in payload: {0}")]
    InvalidUtf8(String),
    /// Read failure reported by a stream the codec was framing.
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ParseError {
    fn from(e: std::io::Error) -> Self {
        ParseError::Io(e.to_string())
    }
}

const DIVIDER: &str = "\n\n";

/// Parse one frame from its textual wire form.
///
/// The header block ends at the first `"\n\n"`. Its first line is the
/// command; every other line is split at its first `:` and both halves are
/// trimmed. Duplicate keys keep the last value. The body starts right after
/// the divider and ends at the first NUL, or at the end of `text` when no NUL
/// is present. A literal NUL inside a body therefore truncates it.
pub fn parse_frame(text: &str) -> Result<Frame, ParseError> {
    let divider = text.find(DIVIDER).ok_or(ParseError::MissingDivider)?;

    let mut lines = text[..divider].split('\n');
    let command = lines.next().unwrap_or_default();
    let command = command.strip_suffix('\r').unwrap_or(command);
    let mut frame = Frame::new(command);

    for line in lines {
        let colon = line
            .find(':')
            .ok_or_else(|| ParseError::MalformedHeader(line.to_string()))?;
        frame.insert_header(line[..colon].trim(), line[colon + 1..].trim());
    }

    let rest = &text[divider + DIVIDER.len()..];
    let body = match rest.find('\0') {
        Some(nul) => &rest[..nul],
        None => rest,
    };
    frame.body = body.to_string();
    Ok(frame)
}

/// Parse one frame from raw payload bytes, validating UTF-8 first.
pub fn parse_frame_bytes(payload: &[u8]) -> Result<Frame, ParseError> {
    let text =
        std::str::from_utf8(payload).map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
    parse_frame(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_connected_without_headers() {
        let f = parse_frame("CONNECTED\n\n\0").expect("parse");
        assert_eq!(f.command, "CONNECTED");
        assert!(f.headers.is_empty());
        assert!(f.body.is_empty());
    }

    #[test]
    fn splits_header_at_first_colon_only() {
        let f = parse_frame("MESSAGE\nurl: http://h:80/x \n\n\0").expect("parse");
        assert_eq!(f.get_header("url"), Some("http://h:80/x"));
    }

    #[test]
    fn strips_carriage_return_from_command() {
        let f = parse_frame("RECEIPT\r\nreceipt-id:7\n\n\0").expect("parse");
        assert_eq!(f.command, "RECEIPT");
    }
}
