use std::io::{self, Write};

use stomp_websocket::{Connection, Frame, MessageCallback};

/// Result of executing a command
pub enum CommandResult {
    /// Command executed successfully
    Ok,
    /// Command succeeded and has something to report
    Info(String),
    /// Command requests exit
    Quit,
    /// Error executing command
    Error(String),
}

/// Parse and execute one line of user input.
pub fn execute_command(line: &str, conn: &Connection) -> CommandResult {
    let parts: Vec<&str> = line.trim().splitn(3, ' ').collect();
    if parts.is_empty() || parts[0].is_empty() {
        return CommandResult::Ok;
    }

    match parts[0] {
        "quit" | "exit" | "q" => CommandResult::Quit,

        "send" => {
            if parts.len() < 3 {
                return CommandResult::Error("Usage: send <destination> <message>".to_string());
            }
            let headers = vec![("content-type".to_string(), "text/plain".to_string())];
            match conn.send(parts[1], headers, parts[2]) {
                Ok(()) => CommandResult::Ok,
                Err(e) => CommandResult::Error(format!("Send error: {}", e)),
            }
        }

        "sub" | "subscribe" => {
            if parts.len() < 2 {
                return CommandResult::Error("Usage: sub <destination>".to_string());
            }
            match subscribe_printing(conn, parts[1]) {
                Ok(id) => CommandResult::Info(format!("Subscribed to {} as {}", parts[1], id)),
                Err(e) => CommandResult::Error(format!("Subscribe error: {}", e)),
            }
        }

        "unsub" | "unsubscribe" => {
            if parts.len() < 2 {
                return CommandResult::Error("Usage: unsub <subscription-id>".to_string());
            }
            match conn.unsubscribe(parts[1], Vec::new()) {
                Ok(()) => CommandResult::Info(format!("Unsubscribed {}", parts[1])),
                Err(e) => CommandResult::Error(format!("Unsubscribe error: {}", e)),
            }
        }

        "begin" | "commit" | "abort" => {
            if parts.len() < 2 {
                return CommandResult::Error(format!("Usage: {} <transaction>", parts[0]));
            }
            let result = match parts[0] {
                "begin" => conn.begin(parts[1], Vec::new()),
                "commit" => conn.commit(parts[1], Vec::new()),
                _ => conn.abort(parts[1], Vec::new()),
            };
            match result {
                Ok(()) => CommandResult::Ok,
                Err(e) => CommandResult::Error(format!("{} error: {}", parts[0], e)),
            }
        }

        "ack" => {
            if parts.len() < 2 {
                return CommandResult::Error("Usage: ack <message-id>".to_string());
            }
            match conn.ack(parts[1], Vec::new()) {
                Ok(()) => CommandResult::Ok,
                Err(e) => CommandResult::Error(format!("Ack error: {}", e)),
            }
        }

        "state" => CommandResult::Info(format!("State: {}", conn.state())),

        "help" | "?" => {
            print_help();
            CommandResult::Ok
        }

        _ => CommandResult::Error(format!("Unknown command: {}. Type 'help' for commands.", parts[0])),
    }
}

/// Subscribe to `dest`, printing every MESSAGE to stdout.
pub fn subscribe_printing(
    conn: &Connection,
    dest: &str,
) -> Result<String, stomp_websocket::ConnError> {
    let label = dest.to_string();
    let callback: MessageCallback = Box::new(move |frame: &Frame| print_message(&label, frame));
    conn.subscribe(dest, Some(callback), Vec::new())
}

fn print_message(dest: &str, frame: &Frame) {
    println!("\n[{}] MESSAGE received:", dest);
    for (k, v) in &frame.headers {
        println!("  {}: {}", k, v);
    }
    if !frame.body.is_empty() {
        println!("  Body: {}", frame.body);
    }
    print!("> ");
    let _ = io::stdout().flush();
}

/// Print help text
pub fn print_help() {
    println!("Commands:");
    println!("  send <destination> <message>  - Send a message");
    println!("  sub <destination>             - Subscribe to a destination");
    println!("  unsub <subscription-id>       - Cancel a subscription");
    println!("  begin|commit|abort <tx>       - Transaction control");
    println!("  ack <message-id>              - Acknowledge a message");
    println!("  state                         - Show connection state");
    println!("  quit                          - Disconnect and exit");
}
