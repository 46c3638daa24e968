use std::fmt;

use crate::frame::Frame;
use crate::parser::ParseError;

/// A broker ERROR frame, with its commonly used headers pulled out.
///
/// The original frame is kept verbatim in `frame`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    /// The `message` header, or `"unknown error"` when absent.
    pub message: String,
    /// Frame body when non-empty.
    pub body: Option<String>,
    /// The `receipt-id` header, set when the error answers a receipted frame.
    pub receipt_id: Option<String>,
    /// The ERROR frame as received.
    pub frame: Frame,
}

impl ServerError {
    pub fn from_frame(frame: Frame) -> Self {
        let message = frame
            .get_header("message")
            .unwrap_or("unknown error")
            .to_string();
        let receipt_id = frame.get_header("receipt-id").map(str::to_string);
        let body = if frame.body.is_empty() {
            None
        } else {
            Some(frame.body.clone())
        };
        Self {
            message,
            body,
            receipt_id,
            frame,
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "STOMP server error: {}", self.message)?;
        if let Some(body) = &self.body {
            write!(f, " ({})", body)?;
        }
        Ok(())
    }
}

impl std::error::Error for ServerError {}

/// What the error handler receives.
///
/// Neither kind closes the connection: a server ERROR is reported as is and a
/// payload that fails to decode is skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorEvent {
    /// The broker sent an ERROR frame.
    Server(ServerError),
    /// An inbound payload could not be decoded.
    Parse(ParseError),
}

impl ErrorEvent {
    pub fn is_server(&self) -> bool {
        matches!(self, ErrorEvent::Server(_))
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, ErrorEvent::Parse(_))
    }

    /// The ERROR frame, if this event carries one.
    pub fn frame(&self) -> Option<&Frame> {
        match self {
            ErrorEvent::Server(err) => Some(&err.frame),
            ErrorEvent::Parse(_) => None,
        }
    }
}

impl fmt::Display for ErrorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorEvent::Server(err) => err.fmt(f),
            ErrorEvent::Parse(err) => write!(f, "parse error: {}", err),
        }
    }
}

impl From<ServerError> for ErrorEvent {
    fn from(err: ServerError) -> Self {
        ErrorEvent::Server(err)
    }
}

impl From<ParseError> for ErrorEvent {
    fn from(err: ParseError) -> Self {
        ErrorEvent::Parse(err)
    }
}
