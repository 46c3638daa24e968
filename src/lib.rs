//! STOMP client over a message-oriented WebSocket transport.
//!
//! A [`Connection`] owns one session task that speaks STOMP frames over the
//! socket, negotiates heartbeats on CONNECTED and routes MESSAGE frames to
//! per-subscription callbacks.

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod heartbeat;
pub mod parser;
pub mod subscription;
pub mod transport;

pub use codec::{StompCodec, StompItem, encode_frame};
pub use config::ConnectOptions;
pub use connection::{
    ACCEPT_VERSION, ConnError, Connection, ConnectionState, DisconnectCallback, Handlers,
};
pub use error::{ErrorEvent, ServerError};
pub use frame::{Command, Frame};
pub use heartbeat::{HeartbeatConfig, negotiate_heartbeats, parse_heartbeat_header};
pub use parser::{ParseError, parse_frame};
pub use subscription::MessageCallback;
pub use transport::{Connector, TransportCommand, TransportEvent, TransportLink, TransportPeer, WsConnector};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smoke_frame_display() {
        let f = Frame::new("SEND")
            .header("destination", "/queue/a")
            .set_body("hello");
        let s = format!("{}", f);
        assert!(s.contains("SEND"));
        assert!(s.contains("Body (5 bytes)"));
    }
}
