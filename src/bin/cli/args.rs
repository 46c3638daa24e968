use clap::Parser;

#[derive(Parser)]
#[command(name = "stomp-ws")]
#[command(version)]
#[command(about = "Interactive STOMP-over-WebSocket client")]
pub struct Cli {
    /// Broker WebSocket endpoint
    #[arg(short, long, default_value = "ws://127.0.0.1:15674/ws")]
    pub url: String,

    /// Login username
    #[arg(short, long, default_value = "guest")]
    pub login: String,

    /// Passcode
    #[arg(short, long, default_value = "guest")]
    pub passcode: String,

    /// Heartbeat settings (client-send,client-receive in ms)
    #[arg(long, default_value = "10000,10000")]
    pub heartbeat: String,

    /// Destinations to subscribe to (can be specified multiple times)
    #[arg(short, long)]
    pub subscribe: Vec<String>,

    /// Log filter, overridden by RUST_LOG (e.g. "warn", "stomp_websocket=debug")
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}
