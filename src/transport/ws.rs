//! WebSocket transport over `tokio-tungstenite`.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::error::UrlError;
use tokio_tungstenite::tungstenite::http::{self, HeaderValue, header::SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

use super::{Connector, TransportCommand, TransportEvent, TransportLink, TransportPeer};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens plain `ws://` sockets, requesting the given subprotocols.
///
/// No TLS backend is compiled in: a `wss://` URL is rejected before any
/// TCP connect and reported as a `connect failed` close.
///
/// Each `open` spawns one task that owns the socket until either side closes
/// it. Outbound payloads go out as text messages when they are valid UTF-8
/// and as binary messages otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WsConnector {
    fn open(&self, url: &str, protocols: &[&str]) -> TransportLink {
        let (link, peer) = TransportLink::pair();
        tokio::spawn(run_socket(url.to_string(), protocols.join(", "), peer));
        link
    }
}

async fn run_socket(url: String, protocols: String, peer: TransportPeer) {
    let TransportPeer {
        mut commands,
        events,
    } = peer;

    let reason = match open_socket(&url, &protocols).await {
        Ok(ws) => {
            let _ = events.send(TransportEvent::Open);
            pump(ws, &mut commands, &events).await
        }
        Err(e) => {
            warn!(%url, error = %e, "websocket connect failed");
            format!("connect failed: {}", e)
        }
    };
    debug!(%url, %reason, "websocket finished");
    let _ = events.send(TransportEvent::Closed(reason));
}

async fn open_socket(url: &str, protocols: &str) -> Result<WsStream, tungstenite::Error> {
    let mut request = url.into_client_request()?;
    if request.uri().scheme_str() == Some("wss") {
        return Err(UrlError::TlsFeatureNotEnabled.into());
    }
    if !protocols.is_empty() {
        let value = HeaderValue::from_str(protocols).map_err(http::Error::from)?;
        request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
    }
    let (ws, response) = connect_async(request).await?;
    debug!(%url, status = %response.status(), "websocket handshake complete");
    Ok(ws)
}

/// Move payloads both ways until the socket closes; returns the reason.
async fn pump(
    ws: WsStream,
    commands: &mut mpsc::UnboundedReceiver<TransportCommand>,
    events: &mpsc::UnboundedSender<TransportEvent>,
) -> String {
    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(TransportCommand::Send(payload)) => {
                    if let Err(e) = sink.send(to_message(payload)).await {
                        return format!("send failed: {}", e);
                    }
                }
                Some(TransportCommand::Close) | None => {
                    let _ = sink.close().await;
                    return "closed by client".to_string();
                }
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Close(frame))) => {
                    return match frame {
                        Some(cf) => format!(
                            "closed by server (code {}): {}",
                            u16::from(cf.code),
                            cf.reason.as_str()
                        ),
                        None => "closed by server".to_string(),
                    };
                }
                Some(Ok(message @ (Message::Text(_) | Message::Binary(_)))) => {
                    if events.send(TransportEvent::Message(message.into_data())).is_err() {
                        let _ = sink.close().await;
                        return "session dropped".to_string();
                    }
                }
                // ping/pong are answered by tungstenite itself
                Some(Ok(_)) => {}
                Some(Err(e)) => return format!("transport error: {}", e),
                None => return "stream ended".to_string(),
            },
        }
    }
}

fn to_message(payload: Bytes) -> Message {
    match String::from_utf8(payload.to_vec()) {
        Ok(text) => Message::text(text),
        Err(_) => Message::binary(payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_payloads_become_text() {
        let msg = to_message(Bytes::from_static(b"SEND\n\nhi\0"));
        assert!(msg.is_text());
        assert_eq!(msg.into_data(), Bytes::from_static(b"SEND\n\nhi\0"));
    }

    #[test]
    fn non_utf8_payloads_become_binary() {
        let msg = to_message(Bytes::from_static(&[0xff, 0xfe, 0x00]));
        assert!(msg.is_binary());
    }
}
