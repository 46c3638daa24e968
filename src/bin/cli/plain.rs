use std::io::{self, BufRead, Write};

use stomp_websocket::{
    ConnectOptions, Connection, DisconnectCallback, ErrorEvent, Handlers, HeartbeatConfig,
};
use tokio::sync::{mpsc, oneshot};

use super::args::Cli;
use super::commands::{CommandResult, execute_command, print_help, subscribe_printing};
use super::exit_codes;

/// Session events relayed from the connection handlers to the prompt loop.
enum SessionEvent {
    Connected(String),
    BrokerError(String),
    Closed(String),
}

/// Run the interactive client
pub async fn run(cli: &Cli) -> Result<(), (String, u8)> {
    let heartbeat = HeartbeatConfig::from_header(&cli.heartbeat);
    let options = ConnectOptions::default().heartbeat(heartbeat.outgoing, heartbeat.incoming);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<SessionEvent>();
    let tx_connect = event_tx.clone();
    let tx_error = event_tx.clone();
    let tx_close = event_tx;
    let handlers = Handlers::new()
        .on_connect(move |frame| {
            let version = frame.get_header("version").unwrap_or("1.0").to_string();
            let _ = tx_connect.send(SessionEvent::Connected(version));
        })
        .on_error(move |event: &ErrorEvent| {
            let mut text = event.to_string();
            if let Some(frame) = event.frame() {
                for (k, v) in &frame.headers {
                    text.push_str(&format!("\n  {}: {}", k, v));
                }
            }
            let _ = tx_error.send(SessionEvent::BrokerError(text));
        })
        .on_close(move |reason| {
            let _ = tx_close.send(SessionEvent::Closed(reason.to_string()));
        });

    let conn = Connection::new(cli.url.clone(), handlers, options);
    println!("Connecting to {}...", cli.url);
    conn.connect(&cli.login, &cli.passcode, Vec::new())
        .map_err(|e| (format!("Connection failed: {}", e), exit_codes::NETWORK_ERROR))?;

    // Wait for CONNECTED; an ERROR before it means the broker refused us.
    loop {
        match event_rx.recv().await {
            Some(SessionEvent::Connected(version)) => {
                println!("Connected (STOMP {}).", version);
                break;
            }
            Some(SessionEvent::BrokerError(msg)) => {
                let _ = conn.disconnect(None);
                return Err((format!("Broker rejected connection: {}", msg), exit_codes::AUTH_ERROR));
            }
            Some(SessionEvent::Closed(reason)) => {
                return Err((format!("Connection failed: {}", reason), exit_codes::NETWORK_ERROR));
            }
            None => {
                return Err(("Connection failed: session ended".to_string(), exit_codes::NETWORK_ERROR));
            }
        }
    }

    for dest in &cli.subscribe {
        let id = subscribe_printing(&conn, dest).map_err(|e| {
            (format!("Failed to subscribe to '{}': {}", dest, e), exit_codes::USAGE_ERROR)
        })?;
        println!("Subscribed to {} as {}", dest, id);
    }

    // Channel to receive user commands from stdin reader
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<String>(16);

    // Spawn blocking stdin reader
    std::thread::spawn(move || {
        let stdin = io::stdin();
        let reader = stdin.lock();
        for line in reader.lines() {
            match line {
                Ok(l) => {
                    if cmd_tx.blocking_send(l).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    println!();
    print_help();
    println!();

    loop {
        print!("> ");
        let _ = io::stdout().flush();

        tokio::select! {
            line = cmd_rx.recv() => {
                let Some(line) = line else {
                    disconnect(&conn).await;
                    break;
                };
                match execute_command(&line, &conn) {
                    CommandResult::Ok => {}
                    CommandResult::Info(msg) => println!("{}", msg),
                    CommandResult::Error(msg) => eprintln!("{}", msg),
                    CommandResult::Quit => {
                        println!("Disconnecting...");
                        disconnect(&conn).await;
                        break;
                    }
                }
            }
            event = event_rx.recv() => match event {
                Some(SessionEvent::BrokerError(msg)) => eprintln!("\n[BROKER ERROR] {}", msg),
                Some(SessionEvent::Connected(_)) => {}
                Some(SessionEvent::Closed(reason)) => {
                    return Err((format!("Connection closed: {}", reason), exit_codes::NETWORK_ERROR));
                }
                None => break,
            },
        }
    }

    Ok(())
}

/// Disconnect and wait until the session has run the callback.
async fn disconnect(conn: &Connection) {
    let (done_tx, done_rx) = oneshot::channel();
    let callback: DisconnectCallback = Box::new(move || {
        let _ = done_tx.send(());
    });
    if conn.disconnect(Some(callback)).is_ok() {
        let _ = done_rx.await;
    }
}
