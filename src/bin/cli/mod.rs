pub mod args;
pub mod commands;
pub mod plain;

/// Exit codes for different error conditions
pub mod exit_codes {
    /// Successful execution
    pub const SUCCESS: u8 = 0;
    /// Transport error (e.g., host unreachable, socket closed by the peer)
    pub const NETWORK_ERROR: u8 = 1;
    /// Broker rejected the CONNECT frame
    pub const AUTH_ERROR: u8 = 2;
    /// Invalid command-line input
    pub const USAGE_ERROR: u8 = 3;
}
