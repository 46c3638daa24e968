use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::future;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, info, trace, warn};

use crate::codec::{StompCodec, StompItem};
use crate::config::ConnectOptions;
use crate::error::{ErrorEvent, ServerError};
use crate::frame::{Command, Frame};
use crate::heartbeat::{HeartbeatMonitor, HeartbeatTick, negotiate_heartbeats, parse_heartbeat_header};
use crate::subscription::{MessageCallback, Subscription, SubscriptionIds, SubscriptionRegistry};
use crate::transport::{
    Connector, STOMP_SUBPROTOCOL, TransportCommand, TransportEvent, TransportLink, WsConnector,
};

/// Protocol versions offered in the `accept-version` CONNECT header.
pub const ACCEPT_VERSION: &str = "1.2,1.1,1.0";

/// Handler for CONNECTED and RECEIPT frames.
pub type FrameCallback = Box<dyn FnMut(&Frame) + Send + 'static>;
/// Handler for server ERROR frames and undecodable payloads.
pub type ErrorCallback = Box<dyn FnMut(&ErrorEvent) + Send + 'static>;
/// Handler called with the reason once the connection reaches `Closed`.
pub type CloseCallback = Box<dyn FnMut(&str) + Send + 'static>;
/// Called once `disconnect` has sent DISCONNECT and closed the transport.
pub type DisconnectCallback = Box<dyn FnOnce() + Send + 'static>;

/// Errors returned by `Connection` operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnError {
    /// The transport is not open, so nothing can be sent.
    #[error("not connected (state: {0})")]
    NotConnected(ConnectionState),
    /// `connect` was called while a previous attempt is still live.
    #[error("connection attempt already in progress (state: {0})")]
    AlreadyConnected(ConnectionState),
    /// The session task is gone.
    #[error("session task has stopped")]
    SessionClosed,
}

/// Transport readiness, not protocol handshake progress: `Open` only means
/// the socket accepts writes, not that CONNECTED has arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Open => "OPEN",
            ConnectionState::Closing => "CLOSING",
            ConnectionState::Closed => "CLOSED",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Open,
            2 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State shared between the handles and the session task.
#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    fn new() -> Self {
        Self(AtomicU8::new(ConnectionState::Closed as u8))
    }

    fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn set(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// `Closed -> Connecting`, or the state that prevented it.
    fn begin_connect(&self) -> Result<(), ConnectionState> {
        self.0
            .compare_exchange(
                ConnectionState::Closed as u8,
                ConnectionState::Connecting as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map(|_| ())
            .map_err(ConnectionState::from_u8)
    }
}

/// Application callbacks. Every handler is optional; a missing one turns the
/// corresponding event into a no-op.
///
/// All handlers run on the session task, one at a time, in the order the
/// triggering events were received.
#[derive(Default)]
pub struct Handlers {
    on_connect: Option<FrameCallback>,
    on_receipt: Option<FrameCallback>,
    on_error: Option<ErrorCallback>,
    on_close: Option<CloseCallback>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with the CONNECTED frame, after heartbeats are armed.
    pub fn on_connect(mut self, f: impl FnMut(&Frame) + Send + 'static) -> Self {
        self.on_connect = Some(Box::new(f));
        self
    }

    pub fn on_receipt(mut self, f: impl FnMut(&Frame) + Send + 'static) -> Self {
        self.on_receipt = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnMut(&ErrorEvent) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn on_close(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_close = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_receipt", &self.on_receipt.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_close", &self.on_close.is_some())
            .finish()
    }
}

enum SessionCommand {
    Connect {
        login: String,
        passcode: String,
        headers: Vec<(String, String)>,
    },
    Transmit(Frame),
    Subscribe {
        subscription: Subscription,
        frame: Frame,
    },
    Unsubscribe {
        id: String,
        frame: Frame,
    },
    Disconnect {
        callback: Option<DisconnectCallback>,
    },
}

/// Handle to one STOMP connection.
///
/// Building a `Connection` spawns its session task, which owns the transport,
/// the subscription registry and the heartbeat timers and runs every callback.
/// Handles are cheap to clone; all methods return as soon as the request is
/// queued for the session task. Must be created inside a tokio runtime.
///
/// A callback that keeps a clone of its own `Connection` keeps the session
/// task alive until the process ends; call `disconnect` when done.
#[derive(Clone)]
pub struct Connection {
    commands: mpsc::UnboundedSender<SessionCommand>,
    state: Arc<StateCell>,
    ids: Arc<SubscriptionIds>,
    subscription_buffer: usize,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Create a connection to a `ws://` endpoint.
    ///
    /// Nothing is opened until [`Connection::connect`] is called.
    pub fn new(url: impl Into<String>, handlers: Handlers, options: ConnectOptions) -> Self {
        Self::with_connector(WsConnector::new(), url, handlers, options)
    }

    /// Like [`Connection::new`] but with a caller-supplied transport.
    pub fn with_connector<C: Connector>(
        connector: C,
        url: impl Into<String>,
        handlers: Handlers,
        options: ConnectOptions,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(StateCell::new());
        let subscription_buffer = options.subscription_buffer.max(1);
        let session = Session {
            connector,
            url: url.into(),
            options,
            handlers,
            commands: rx,
            state: state.clone(),
            link: None,
            credentials: None,
            registry: SubscriptionRegistry::new(),
            heartbeat: HeartbeatMonitor::new(),
            codec: StompCodec::new(),
        };
        tokio::spawn(session.run());
        Connection {
            commands: tx,
            state,
            ids: Arc::new(SubscriptionIds::new()),
            subscription_buffer,
        }
    }

    /// Open the transport and, once it is up, send CONNECT.
    ///
    /// Parameters
    /// - `login`, `passcode`: credentials for the CONNECT frame.
    /// - `headers`: extra CONNECT headers. `login`, `passcode`,
    ///   `accept-version` and `heart-beat` are always set by the client and
    ///   override same-named entries here.
    ///
    /// The connect handler fires only when the broker answers with
    /// CONNECTED. Transport failures are reported through the close handler.
    pub fn connect(
        &self,
        login: &str,
        passcode: &str,
        headers: Vec<(String, String)>,
    ) -> Result<(), ConnError> {
        self.state
            .begin_connect()
            .map_err(ConnError::AlreadyConnected)?;
        let queued = self.submit(SessionCommand::Connect {
            login: login.to_string(),
            passcode: passcode.to_string(),
            headers,
        });
        if queued.is_err() {
            self.state.set(ConnectionState::Closed);
        }
        queued
    }

    /// Send DISCONNECT, close the transport, then run `callback`.
    ///
    /// Fire and forget: no DISCONNECT receipt is awaited. The close handler
    /// fires after `callback`.
    pub fn disconnect(&self, callback: Option<DisconnectCallback>) -> Result<(), ConnError> {
        match self.state.get() {
            ConnectionState::Closed => Err(ConnError::NotConnected(ConnectionState::Closed)),
            _ => self.submit(SessionCommand::Disconnect { callback }),
        }
    }

    /// Send a message to `destination`.
    pub fn send(
        &self,
        destination: &str,
        headers: Vec<(String, String)>,
        body: impl Into<String>,
    ) -> Result<(), ConnError> {
        let frame = with_headers(Command::Send, headers)
            .header("destination", destination)
            .set_body(body);
        self.transmit(frame)
    }

    /// Subscribe to `destination` and return the new subscription id.
    ///
    /// Ids are `sub-0`, `sub-1`, ... in call order and never reused. The
    /// callback is registered before SUBSCRIBE goes out, so no MESSAGE for
    /// this id can be missed.
    pub fn subscribe(
        &self,
        destination: &str,
        callback: Option<MessageCallback>,
        headers: Vec<(String, String)>,
    ) -> Result<String, ConnError> {
        self.ensure_open()?;
        let id = self.ids.next_id();
        let frame = with_headers(Command::Subscribe, headers)
            .header("destination", destination)
            .header("id", id.as_str());
        self.submit(SessionCommand::Subscribe {
            subscription: Subscription::new(id.as_str(), destination, callback),
            frame,
        })?;
        Ok(id)
    }

    /// Subscribe and receive MESSAGE frames on a channel instead of a
    /// callback.
    ///
    /// The channel holds `ConnectOptions::subscription_buffer` frames; when
    /// it is full, or the receiver was dropped, new frames are discarded.
    pub fn subscribe_channel(
        &self,
        destination: &str,
        headers: Vec<(String, String)>,
    ) -> Result<(String, mpsc::Receiver<Frame>), ConnError> {
        let (tx, rx) = mpsc::channel(self.subscription_buffer);
        let dest = destination.to_string();
        let forward: MessageCallback = Box::new(move |frame: &Frame| {
            if let Err(e) = tx.try_send(frame.clone()) {
                warn!(destination = %dest, error = %e, "dropping MESSAGE for channel subscription");
            }
        });
        let id = self.subscribe(destination, Some(forward), headers)?;
        Ok((id, rx))
    }

    /// Remove subscription `id` locally, then send UNSUBSCRIBE.
    ///
    /// MESSAGE frames for `id` that arrive after this call are dropped.
    pub fn unsubscribe(&self, id: &str, headers: Vec<(String, String)>) -> Result<(), ConnError> {
        self.ensure_open()?;
        let frame = with_headers(Command::Unsubscribe, headers).header("id", id);
        self.submit(SessionCommand::Unsubscribe {
            id: id.to_string(),
            frame,
        })
    }

    /// Begin a transaction.
    pub fn begin(&self, transaction: &str, headers: Vec<(String, String)>) -> Result<(), ConnError> {
        self.send_transaction_frame(Command::Begin, transaction, headers)
    }

    /// Commit a transaction started with [`Connection::begin`].
    pub fn commit(&self, transaction: &str, headers: Vec<(String, String)>) -> Result<(), ConnError> {
        self.send_transaction_frame(Command::Commit, transaction, headers)
    }

    /// Abort a transaction started with [`Connection::begin`].
    pub fn abort(&self, transaction: &str, headers: Vec<(String, String)>) -> Result<(), ConnError> {
        self.send_transaction_frame(Command::Abort, transaction, headers)
    }

    /// Acknowledge a message by its `message-id`.
    pub fn ack(&self, message_id: &str, headers: Vec<(String, String)>) -> Result<(), ConnError> {
        let frame = with_headers(Command::Ack, headers).header("message-id", message_id);
        self.transmit(frame)
    }

    /// Current transport readiness; `Closed` before the first `connect`.
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    fn send_transaction_frame(
        &self,
        command: Command,
        transaction: &str,
        headers: Vec<(String, String)>,
    ) -> Result<(), ConnError> {
        let frame = with_headers(command, headers).header("transaction", transaction);
        self.transmit(frame)
    }

    fn transmit(&self, frame: Frame) -> Result<(), ConnError> {
        self.ensure_open()?;
        self.submit(SessionCommand::Transmit(frame))
    }

    fn ensure_open(&self) -> Result<(), ConnError> {
        match self.state.get() {
            ConnectionState::Open => Ok(()),
            other => Err(ConnError::NotConnected(other)),
        }
    }

    fn submit(&self, command: SessionCommand) -> Result<(), ConnError> {
        self.commands
            .send(command)
            .map_err(|_| ConnError::SessionClosed)
    }
}

fn with_headers(command: Command, headers: Vec<(String, String)>) -> Frame {
    headers
        .into_iter()
        .fold(Frame::from(command), |f, (k, v)| f.header(k, v))
}

struct Credentials {
    login: String,
    passcode: String,
    headers: Vec<(String, String)>,
}

/// The session task: sole owner of the transport link, registry, heartbeat
/// timers and handlers. Commands, transport events and timer ticks are
/// handled one at a time in a single loop.
struct Session<C> {
    connector: C,
    url: String,
    options: ConnectOptions,
    handlers: Handlers,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    state: Arc<StateCell>,
    link: Option<TransportLink>,
    credentials: Option<Credentials>,
    registry: SubscriptionRegistry,
    heartbeat: HeartbeatMonitor,
    codec: StompCodec,
}

impl<C: Connector> Session<C> {
    async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.on_command(cmd),
                    None => break,
                },
                event = next_event(self.link.as_mut()) => self.on_transport(event),
                tick = self.heartbeat.tick() => self.on_heartbeat(tick),
            }
        }
        if self.link.is_some() {
            let reason = format!("connection to {} dropped", self.url);
            self.teardown(reason);
        }
        debug!(url = %self.url, "session task finished");
    }

    fn on_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Connect {
                login,
                passcode,
                headers,
            } => self.open(Credentials {
                login,
                passcode,
                headers,
            }),
            SessionCommand::Transmit(frame) => self.transmit(frame),
            SessionCommand::Subscribe {
                subscription,
                frame,
            } => {
                if self.link.is_none() {
                    warn!(id = subscription.id(), destination = subscription.destination(), "subscribe dropped: no transport");
                    return;
                }
                debug!(id = subscription.id(), destination = subscription.destination(), "subscribe");
                self.registry.insert(subscription);
                self.transmit(frame);
            }
            SessionCommand::Unsubscribe { id, frame } => {
                if self.registry.remove(&id).is_none() {
                    debug!(%id, "unsubscribe for unknown subscription");
                }
                self.transmit(frame);
            }
            SessionCommand::Disconnect { callback } => self.disconnect(callback),
        }
    }

    fn open(&mut self, credentials: Credentials) {
        if self.link.is_some() {
            warn!(url = %self.url, "connect ignored: transport already present");
            return;
        }
        info!(url = %self.url, "opening transport");
        self.state.set(ConnectionState::Connecting);
        self.heartbeat.reset();
        self.credentials = Some(credentials);
        self.link = Some(self.connector.open(&self.url, &[STOMP_SUBPROTOCOL]));
    }

    fn on_transport(&mut self, event: Option<TransportEvent>) {
        match event {
            Some(TransportEvent::Open) => {
                info!(url = %self.url, "transport open");
                self.state.set(ConnectionState::Open);
                let connect = self.connect_frame();
                self.transmit(connect);
            }
            Some(TransportEvent::Message(payload)) => self.on_payload(payload),
            Some(TransportEvent::Closed(reason)) => {
                let reason = format!("lost connection to {}: {}", self.url, reason);
                self.teardown(reason);
            }
            None => {
                let reason = format!("lost connection to {}: transport ended", self.url);
                self.teardown(reason);
            }
        }
    }

    fn connect_frame(&mut self) -> Frame {
        let Credentials {
            login,
            passcode,
            headers,
        } = self.credentials.take().unwrap_or_else(|| Credentials {
            login: String::new(),
            passcode: String::new(),
            headers: Vec::new(),
        });

        let mut frame = Frame::from(Command::Connect);
        for (k, v) in &self.options.headers {
            frame.insert_header(k.as_str(), v.as_str());
        }
        if let Some(host) = &self.options.host {
            frame.insert_header("host", host.as_str());
        }
        for (k, v) in headers {
            frame.insert_header(k, v);
        }
        frame
            .header("login", login)
            .header("passcode", passcode)
            .header("accept-version", ACCEPT_VERSION)
            .header("heart-beat", self.options.heartbeat.header_value())
    }

    fn on_payload(&mut self, payload: Bytes) {
        self.heartbeat.record_activity();
        let mut buf = BytesMut::from(&payload[..]);
        loop {
            match self.codec.decode_eof(&mut buf) {
                Ok(Some(StompItem::Heartbeat)) => trace!("<<< heartbeat"),
                Ok(Some(StompItem::Frame(frame))) => self.on_frame(frame),
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "dropping undecodable payload");
                    if let Some(cb) = self.handlers.on_error.as_mut() {
                        cb(&ErrorEvent::Parse(e));
                    }
                }
            }
        }
    }

    fn on_frame(&mut self, frame: Frame) {
        debug!("<<< {}", frame.command);
        trace!("<<< {}", frame);
        match frame.kind() {
            Some(Command::Connected) => self.on_connected(frame),
            Some(Command::Message) => {
                if !self.registry.dispatch(&frame) {
                    debug!(
                        subscription = frame.get_header("subscription").unwrap_or(""),
                        "dropping MESSAGE for unknown subscription"
                    );
                }
            }
            Some(Command::Receipt) => {
                if let Some(cb) = self.handlers.on_receipt.as_mut() {
                    cb(&frame);
                }
            }
            Some(Command::Error) => {
                let err = ServerError::from_frame(frame);
                warn!(error = %err.message, "server sent ERROR");
                if let Some(cb) = self.handlers.on_error.as_mut() {
                    cb(&ErrorEvent::Server(err));
                }
            }
            _ => debug!(command = %frame.command, "ignoring unexpected frame"),
        }
    }

    fn on_connected(&mut self, frame: Frame) {
        let version = frame.get_header("version").unwrap_or("1.0");
        if matches!(version, "1.1" | "1.2") {
            let (server_out, server_in) =
                parse_heartbeat_header(frame.get_header("heart-beat").unwrap_or("0,0"));
            let local = self.options.heartbeat;
            let (outgoing, incoming) =
                negotiate_heartbeats(local.outgoing, local.incoming, server_out, server_in);
            if self.heartbeat.arm(outgoing, incoming) {
                info!(%version, ?outgoing, ?incoming, "heartbeats negotiated");
            }
        } else {
            info!(%version, "connected without heartbeats");
        }
        if let Some(cb) = self.handlers.on_connect.as_mut() {
            cb(&frame);
        }
    }

    fn on_heartbeat(&mut self, tick: HeartbeatTick) {
        match tick {
            HeartbeatTick::Ping => {
                trace!(">>> heartbeat");
                self.write(StompItem::Heartbeat);
            }
            HeartbeatTick::Check => {
                let now = Instant::now();
                if !self.heartbeat.is_stale(now) {
                    return;
                }
                let silence = millis(self.heartbeat.silence(now));
                let limit = self.heartbeat.tolerance().map(millis).unwrap_or_default();
                warn!(url = %self.url, silence_ms = silence, limit_ms = limit, "server heartbeat timed out");
                let reason = format!(
                    "no heartbeat from {} for {}ms (limit {}ms)",
                    self.url, silence, limit
                );
                self.teardown(reason);
            }
        }
    }

    fn disconnect(&mut self, callback: Option<DisconnectCallback>) {
        if self.link.is_none() {
            if let Some(cb) = callback {
                cb();
            }
            return;
        }
        // Only an open transport has anyone to say DISCONNECT to.
        if self.state.get() == ConnectionState::Open {
            self.state.set(ConnectionState::Closing);
            self.transmit(Frame::from(Command::Disconnect));
        }
        self.shutdown();
        if let Some(cb) = callback {
            cb();
        }
        let reason = format!("disconnected from {}", self.url);
        self.notify_close(&reason);
    }

    fn transmit(&mut self, frame: Frame) {
        debug!(">>> {}", frame.command);
        trace!(">>> {}", frame);
        self.write(StompItem::Frame(frame));
    }

    fn write(&mut self, item: StompItem) {
        let Some(link) = self.link.as_ref() else {
            warn!("dropping outbound item: no transport");
            return;
        };
        let mut buf = BytesMut::new();
        if let Err(e) = self.codec.encode(item, &mut buf) {
            warn!(error = %e, "failed to encode outbound item");
            return;
        }
        if link.commands.send(TransportCommand::Send(buf.freeze())).is_err() {
            warn!(url = %self.url, "transport is gone; outbound item dropped");
        }
    }

    /// Cancel timers and close the transport; leaves the session `Closed`.
    fn shutdown(&mut self) {
        self.heartbeat.cancel();
        self.credentials = None;
        if let Some(link) = self.link.take() {
            let _ = link.commands.send(TransportCommand::Close);
        }
        self.state.set(ConnectionState::Closed);
    }

    fn teardown(&mut self, reason: String) {
        self.shutdown();
        self.notify_close(&reason);
    }

    fn notify_close(&mut self, reason: &str) {
        info!(%reason, "connection closed");
        if let Some(cb) = self.handlers.on_close.as_mut() {
            cb(reason);
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

async fn next_event(link: Option<&mut TransportLink>) -> Option<TransportEvent> {
    match link {
        Some(link) => link.events.recv().await,
        None => future::pending().await,
    }
}
