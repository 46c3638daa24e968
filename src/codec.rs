use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::Frame;
use crate::parser::{ParseError, parse_frame_bytes};

/// Frame terminator.
pub const SENTINEL: u8 = 0;

/// A heartbeat pulse is a single LF outside the frame grammar.
pub const HEARTBEAT: u8 = b'\n';

/// Items produced or consumed by the codec.
///
/// A `StompItem` is either a decoded `Frame` or a `Heartbeat` marker
/// representing a single LF received on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StompItem {
    /// A decoded STOMP frame (command + headers + body)
    Frame(Frame),
    /// A single heartbeat pulse (LF)
    Heartbeat,
}

/// Render a frame in wire form.
///
/// Layout: `COMMAND\n`, then `key:value\n` for every header in insertion
/// order, a blank line, the body and a single NUL. Header values are written
/// verbatim, without escaping.
pub fn encode_frame(frame: &Frame) -> String {
    let headers_len: usize = frame
        .headers
        .iter()
        .map(|(k, v)| k.len() + v.len() + 2)
        .sum();
    let mut out =
        String::with_capacity(frame.command.len() + headers_len + frame.body.len() + 3);
    out.push_str(&frame.command);
    out.push('\n');
    for (k, v) in &frame.headers {
        out.push_str(k);
        out.push(':');
        out.push_str(v);
        out.push('\n');
    }
    out.push('\n');
    out.push_str(&frame.body);
    out.push(char::from(SENTINEL));
    out
}

/// `StompCodec` implements `tokio_util::codec::{Decoder, Encoder}` for the
/// sentinel-terminated STOMP profile.
///
/// Each transport payload is fed to the decoder as its own buffer:
/// - a leading LF (or CRLF) decodes as `StompItem::Heartbeat`;
/// - bytes up to the first NUL decode as one frame, and a single LF right
///   after the NUL is swallowed with it;
/// - at end of payload, `decode_eof` parses any remaining bytes as a frame
///   even though no NUL terminated them.
///
/// Binary bodies framed by `content-length` are not supported.
#[derive(Debug, Default)]
pub struct StompCodec {}

impl StompCodec {
    pub fn new() -> Self {
        Self {}
    }
}

impl Decoder for StompCodec {
    type Item = StompItem;
    type Error = ParseError;

    /// Decode the next item from `src`.
    ///
    /// Returns `Ok(None)` when `src` is empty or holds an unterminated frame.
    /// On a parse error the offending frame bytes have already been consumed,
    /// so callers may keep decoding what follows.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match src.first() {
            None => return Ok(None),
            Some(&HEARTBEAT) => {
                src.advance(1);
                return Ok(Some(StompItem::Heartbeat));
            }
            Some(b'\r') if src.get(1) == Some(&HEARTBEAT) => {
                src.advance(2);
                return Ok(Some(StompItem::Heartbeat));
            }
            Some(_) => {}
        }

        let Some(nul) = src.iter().position(|&b| b == SENTINEL) else {
            return Ok(None);
        };
        let raw = src.split_to(nul + 1);
        if src.first() == Some(&HEARTBEAT) {
            src.advance(1);
        }
        let frame = parse_frame_bytes(&raw)?;
        Ok(Some(StompItem::Frame(frame)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(item) = self.decode(src)? {
            return Ok(Some(item));
        }
        if src.is_empty() {
            return Ok(None);
        }
        let raw = src.split();
        let frame = parse_frame_bytes(&raw)?;
        Ok(Some(StompItem::Frame(frame)))
    }
}

impl Encoder<StompItem> for StompCodec {
    type Error = ParseError;

    /// Append the wire form of `item` to `dst`.
    fn encode(&mut self, item: StompItem, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            StompItem::Heartbeat => dst.put_u8(HEARTBEAT),
            StompItem::Frame(frame) => dst.extend_from_slice(encode_frame(&frame).as_bytes()),
        }
        Ok(())
    }
}
