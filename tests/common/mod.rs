//! In-memory transport shared by the connection tests.
//!
//! `MockConnector` hands every opened link's socket side to the test, which
//! then plays the broker: it emits `TransportEvent`s and reads what the
//! session wrote.
#![allow(dead_code)]

use stomp_websocket::parser::parse_frame_bytes;
use stomp_websocket::{
    ConnectOptions, Connection, Connector, ErrorEvent, Frame, Handlers, TransportCommand,
    TransportEvent, TransportLink, TransportPeer, encode_frame,
};
use tokio::sync::mpsc;

pub const URL: &str = "ws://broker.test/ws";

/// One `Connector::open` call as seen by the test.
pub struct Opened {
    pub url: String,
    pub protocols: Vec<String>,
    pub peer: TransportPeer,
}

pub struct MockConnector {
    opened: mpsc::UnboundedSender<Opened>,
}

impl MockConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Opened>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { opened: tx }, rx)
    }
}

impl Connector for MockConnector {
    fn open(&self, url: &str, protocols: &[&str]) -> TransportLink {
        let (link, peer) = TransportLink::pair();
        let _ = self.opened.send(Opened {
            url: url.to_string(),
            protocols: protocols.iter().map(|p| p.to_string()).collect(),
            peer,
        });
        link
    }
}

/// Handler invocations, in the order the session made them.
#[derive(Debug, Clone)]
pub enum Event {
    Connected(Frame),
    Receipt(Frame),
    Error(ErrorEvent),
    Closed(String),
}

pub fn recording_handlers() -> (Handlers, mpsc::UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (t1, t2, t3, t4) = (tx.clone(), tx.clone(), tx.clone(), tx);
    let handlers = Handlers::new()
        .on_connect(move |f| {
            let _ = t1.send(Event::Connected(f.clone()));
        })
        .on_receipt(move |f| {
            let _ = t2.send(Event::Receipt(f.clone()));
        })
        .on_error(move |e| {
            let _ = t3.send(Event::Error(e.clone()));
        })
        .on_close(move |reason| {
            let _ = t4.send(Event::Closed(reason.to_string()));
        });
    (handlers, rx)
}

/// A connection wired to a mock broker.
pub struct Harness {
    pub conn: Connection,
    pub opened: mpsc::UnboundedReceiver<Opened>,
    pub events: mpsc::UnboundedReceiver<Event>,
}

impl Harness {
    pub fn new(options: ConnectOptions) -> Self {
        let (connector, opened) = MockConnector::new();
        let (handlers, events) = recording_handlers();
        let conn = Connection::with_connector(connector, URL, handlers, options);
        Harness {
            conn,
            opened,
            events,
        }
    }

    /// Without heartbeats, so no stray pings show up.
    pub fn quiet() -> Self {
        Self::new(ConnectOptions::default().heartbeat(0, 0))
    }

    /// `connect`, open the transport and return the peer after reading the
    /// CONNECT frame.
    pub async fn open(&mut self) -> (TransportPeer, Frame) {
        self.conn
            .connect("guest", "secret", Vec::new())
            .expect("connect accepted");
        let Opened { mut peer, .. } = self.opened.recv().await.expect("transport opened");
        assert!(peer.emit(TransportEvent::Open));
        let connect = next_frame(&mut peer).await;
        (peer, connect)
    }

    /// Open and complete the handshake with a CONNECTED frame.
    pub async fn established(&mut self, connected: Frame) -> TransportPeer {
        let (peer, _) = self.open().await;
        send_frame(&peer, &connected);
        match self.next_event().await {
            Event::Connected(_) => {}
            other => panic!("expected Connected, got {:?}", other),
        }
        peer
    }

    pub async fn next_event(&mut self) -> Event {
        self.events.recv().await.expect("handlers dropped")
    }
}

pub fn connected_frame(version: &str, heartbeat: &str) -> Frame {
    Frame::new("CONNECTED")
        .header("version", version)
        .header("heart-beat", heartbeat)
}

/// Deliver a frame to the session as one transport message.
pub fn send_frame(peer: &TransportPeer, frame: &Frame) {
    send_raw(peer, encode_frame(frame).as_bytes());
}

pub fn send_raw(peer: &TransportPeer, payload: &[u8]) {
    assert!(peer.emit(TransportEvent::Message(
        bytes::Bytes::copy_from_slice(payload)
    )));
}

/// Next command the session issued to the transport, heartbeats included.
pub async fn next_command(peer: &mut TransportPeer) -> TransportCommand {
    peer.commands.recv().await.expect("session dropped the link")
}

/// Next frame the session wrote, skipping heartbeat pings.
pub async fn next_frame(peer: &mut TransportPeer) -> Frame {
    loop {
        match next_command(peer).await {
            TransportCommand::Send(payload) if &payload[..] == b"\n" => continue,
            TransportCommand::Send(payload) => {
                return parse_frame_bytes(&payload).expect("session wrote a valid frame");
            }
            TransportCommand::Close => panic!("expected a frame, transport was closed"),
        }
    }
}
