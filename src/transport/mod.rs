//! Transport seam between the session task and a duplex, message-oriented
//! socket.
//!
//! A [`Connector`] opens a [`TransportLink`]: commands flow down
//! (`Send`/`Close`), events flow up (`Open`, `Message`, `Closed`) on a single
//! ordered stream. The WebSocket implementation lives in [`ws`]; tests plug
//! in their own connector and drive the [`TransportPeer`] half directly.

use bytes::Bytes;
use tokio::sync::mpsc;

pub mod ws;

pub use ws::WsConnector;

/// WebSocket subprotocol requested when opening the socket.
pub const STOMP_SUBPROTOCOL: &str = "stomp";

/// Something that happened on the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The socket is ready for writes.
    Open,
    /// One inbound payload, text or binary, as raw bytes.
    Message(Bytes),
    /// The socket is gone; sent at most once, with a human-readable reason.
    Closed(String),
}

/// Instruction for the socket owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    /// Write one payload.
    Send(Bytes),
    /// Close the socket.
    Close,
}

/// Session-side half of an open transport.
#[derive(Debug)]
pub struct TransportLink {
    pub commands: mpsc::UnboundedSender<TransportCommand>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Socket-side half of an open transport.
#[derive(Debug)]
pub struct TransportPeer {
    pub commands: mpsc::UnboundedReceiver<TransportCommand>,
    pub events: mpsc::UnboundedSender<TransportEvent>,
}

impl TransportLink {
    /// Create a connected link/peer pair.
    pub fn pair() -> (TransportLink, TransportPeer) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (evt_tx, evt_rx) = mpsc::unbounded_channel();
        (
            TransportLink {
                commands: cmd_tx,
                events: evt_rx,
            },
            TransportPeer {
                commands: cmd_rx,
                events: evt_tx,
            },
        )
    }
}

impl TransportPeer {
    /// Report an event to the session. Returns `false` once the session has
    /// dropped its link.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.events.send(event).is_ok()
    }
}

/// Opens transports for the session task.
///
/// `open` is called from inside the tokio runtime and must return right
/// away; the connection outcome is reported through the link's events
/// (`Open`, or `Closed` with the failure reason).
pub trait Connector: Send + Sync + 'static {
    fn open(&self, url: &str, protocols: &[&str]) -> TransportLink;
}

impl<C: Connector + ?Sized> Connector for std::sync::Arc<C> {
    fn open(&self, url: &str, protocols: &[&str]) -> TransportLink {
        (**self).open(url, protocols)
    }
}
