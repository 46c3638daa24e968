use crate::heartbeat::HeartbeatConfig;

/// Default capacity of the channel behind `Connection::subscribe_channel`.
pub const DEFAULT_SUBSCRIPTION_BUFFER: usize = 16;

/// Options applied to every connection attempt of a `Connection`.
///
/// ```
/// use stomp_websocket::ConnectOptions;
///
/// let opts = ConnectOptions::default()
///     .heartbeat(5_000, 20_000)
///     .host("/")
///     .header("client-id", "dashboard");
/// assert_eq!(opts.heartbeat.header_value(), "5000,20000");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Local heartbeat intervals offered on CONNECT.
    pub heartbeat: HeartbeatConfig,
    /// Virtual host; sent as the `host` CONNECT header when set.
    pub host: Option<String>,
    /// Extra CONNECT headers. Headers passed to `Connection::connect`
    /// override these on key collisions.
    pub headers: Vec<(String, String)>,
    /// Capacity of each `subscribe_channel` receiver. Zero is treated as one.
    pub subscription_buffer: usize,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            heartbeat: HeartbeatConfig::default(),
            host: None,
            headers: Vec::new(),
            subscription_buffer: DEFAULT_SUBSCRIPTION_BUFFER,
        }
    }
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the heartbeat intervals in milliseconds (`0` disables a direction).
    pub fn heartbeat(mut self, outgoing: u64, incoming: u64) -> Self {
        self.heartbeat = HeartbeatConfig::new(outgoing, incoming);
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Add an extra CONNECT header.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn subscription_buffer(mut self, capacity: usize) -> Self {
        self.subscription_buffer = capacity.max(1);
        self
    }
}
