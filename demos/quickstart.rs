use std::time::Duration;

use stomp_websocket::{ConnectOptions, Connection, Frame, Handlers, MessageCallback};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // This example expects a broker with a STOMP-over-WebSocket endpoint on
    // localhost:15674 (e.g. RabbitMQ with the web_stomp plugin).

    let (connected_tx, mut connected_rx) = mpsc::unbounded_channel();
    let handlers = Handlers::new()
        .on_connect(move |frame| {
            let _ = connected_tx.send(frame.clone());
        })
        .on_error(|err| eprintln!("error: {}", err))
        .on_close(|reason| println!("closed: {}", reason));

    let conn = Connection::new("ws://127.0.0.1:15674/ws", handlers, ConnectOptions::default());
    conn.connect("guest", "guest", Vec::new())?;

    match tokio::time::timeout(Duration::from_secs(5), connected_rx.recv()).await {
        Ok(Some(frame)) => println!("connected:\n{}", frame),
        _ => {
            println!("broker did not answer CONNECT");
            return Ok(());
        }
    }

    let (msg_tx, mut msg_rx) = mpsc::unbounded_channel();
    let on_message: MessageCallback = Box::new(move |frame: &Frame| {
        let _ = msg_tx.send(frame.clone());
    });
    let id = conn.subscribe("/queue/test", Some(on_message), Vec::new())?;
    println!("subscribed as {}", id);

    conn.send("/queue/test", Vec::new(), "hello from stomp-websocket example")?;

    // Wait for the message to come back, but don't block forever.
    match tokio::time::timeout(Duration::from_secs(5), msg_rx.recv()).await {
        Ok(Some(frame)) => println!("received frame:\n{}", frame),
        Ok(None) => println!("subscription closed, no frames received"),
        Err(_) => println!("timed out waiting for a frame"),
    }

    conn.unsubscribe(&id, Vec::new())?;
    conn.disconnect(None)?;
    // Give the session task a moment to flush DISCONNECT.
    tokio::time::sleep(Duration::from_millis(100)).await;

    Ok(())
}
