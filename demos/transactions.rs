use std::time::Duration;

use stomp_websocket::{ConnectOptions, Connection, DisconnectCallback, Handlers};
use tokio::sync::{mpsc, oneshot};

fn in_tx(tx_id: &str) -> Vec<(String, String)> {
    vec![("transaction".to_string(), tx_id.to_string())]
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // This example expects a broker with a STOMP-over-WebSocket endpoint on
    // localhost:15674 (e.g. RabbitMQ with the web_stomp plugin).

    let (connected_tx, mut connected_rx) = mpsc::unbounded_channel();
    let handlers = Handlers::new()
        .on_connect(move |_frame| {
            let _ = connected_tx.send(());
        })
        .on_error(|err| eprintln!("error: {}", err));

    let options = ConnectOptions::default().heartbeat(5_000, 5_000).host("/");
    let conn = Connection::new("ws://127.0.0.1:15674/ws", handlers, options);
    conn.connect("guest", "guest", Vec::new())?;

    if tokio::time::timeout(Duration::from_secs(5), connected_rx.recv())
        .await
        .ok()
        .flatten()
        .is_none()
    {
        println!("broker did not answer CONNECT");
        return Ok(());
    }

    // Begin a transaction
    let tx_id = "tx-example-1";
    conn.begin(tx_id, Vec::new())?;
    println!("Transaction {} started", tx_id);

    // Send messages within the transaction
    conn.send("/queue/test", in_tx(tx_id), "message 1 in transaction")?;
    println!("Sent message 1 in transaction");
    conn.send("/queue/test", in_tx(tx_id), "message 2 in transaction")?;
    println!("Sent message 2 in transaction");

    // Commit the transaction (both messages will be delivered atomically)
    conn.commit(tx_id, Vec::new())?;
    println!("Transaction {} committed", tx_id);

    // Example of aborting a transaction
    let tx_id_2 = "tx-example-2";
    conn.begin(tx_id_2, Vec::new())?;
    println!("\nTransaction {} started", tx_id_2);

    conn.send("/queue/test", in_tx(tx_id_2), "this message will be aborted")?;
    println!("Sent message in transaction {} (will be aborted)", tx_id_2);

    // Abort the transaction (message will not be delivered)
    conn.abort(tx_id_2, Vec::new())?;
    println!("Transaction {} aborted", tx_id_2);

    let (done_tx, done_rx) = oneshot::channel();
    let on_done: DisconnectCallback = Box::new(move || {
        let _ = done_tx.send(());
    });
    conn.disconnect(Some(on_done))?;
    let _ = done_rx.await;

    Ok(())
}
