use std::fmt;
use std::time::Duration;

use futures::future;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

/// Locally configured heartbeat intervals in milliseconds.
///
/// `outgoing` is how often this client can send heartbeats, `incoming` is how
/// often it wants to hear from the server. `0` disables a direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    pub outgoing: u64,
    pub incoming: u64,
}

impl HeartbeatConfig {
    pub fn new(outgoing: u64, incoming: u64) -> Self {
        Self { outgoing, incoming }
    }

    /// Both directions off (`"0,0"`).
    pub fn disabled() -> Self {
        Self::new(0, 0)
    }

    /// Build from a `"cx,cy"` string using [`parse_heartbeat_header`] rules.
    pub fn from_header(value: &str) -> Self {
        let (outgoing, incoming) = parse_heartbeat_header(value);
        Self { outgoing, incoming }
    }

    /// Value of the `heart-beat` header sent on CONNECT.
    pub fn header_value(&self) -> String {
        format!("{},{}", self.outgoing, self.incoming)
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self::new(10_000, 10_000)
    }
}

impl fmt::Display for HeartbeatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.outgoing, self.incoming)
    }
}

/// Parse the STOMP `heart-beat` header value (format: "cx,cy").
///
/// Parameters
/// - `header`: header string from the server or client (for example
///   "10000,10000"). The values represent milliseconds.
///
/// Returns a tuple `(cx, cy)` where each value is the heartbeat interval in
/// milliseconds. Missing or invalid fields default to `0`.
pub fn parse_heartbeat_header(header: &str) -> (u64, u64) {
    let mut parts = header.split(',');
    let cx = parts
        .next()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(0);
    let cy = parts
        .next()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(0);
    (cx, cy)
}

/// Negotiate heartbeat intervals between client and server.
///
/// Parameters
/// - `client_out`: how often the client can send heartbeats (ms).
/// - `client_in`: how often the client wants to receive heartbeats (ms).
/// - `server_out`: server's advertised outgoing interval (ms).
/// - `server_in`: server's advertised incoming interval (ms).
///
/// Returns `(outgoing, incoming)`. A direction is enabled only when both
/// sides declare a non-zero value for it, and then runs at the larger of
/// the two.
pub fn negotiate_heartbeats(
    client_out: u64,
    client_in: u64,
    server_out: u64,
    server_in: u64,
) -> (Option<Duration>, Option<Duration>) {
    fn pair(local: u64, remote: u64) -> Option<Duration> {
        if local == 0 || remote == 0 {
            None
        } else {
            Some(Duration::from_millis(local.max(remote)))
        }
    }
    (pair(client_out, server_in), pair(client_in, server_out))
}

/// Which heartbeat timer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatTick {
    /// Outgoing timer: send one heartbeat byte.
    Ping,
    /// Incoming watchdog: check how long the server has been silent.
    Check,
}

/// Outgoing ping timer and incoming watchdog for one connection attempt.
///
/// Timers are armed at most once per attempt (see [`HeartbeatMonitor::reset`])
/// and `cancel` drops both, after which [`HeartbeatMonitor::tick`] never
/// completes.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    outgoing: Option<Interval>,
    watchdog: Option<Interval>,
    outgoing_period: Option<Duration>,
    incoming_period: Option<Duration>,
    last_activity: Instant,
    armed: bool,
}

impl HeartbeatMonitor {
    pub fn new() -> Self {
        Self {
            outgoing: None,
            watchdog: None,
            outgoing_period: None,
            incoming_period: None,
            last_activity: Instant::now(),
            armed: false,
        }
    }

    /// Arm the timers for the negotiated intervals.
    ///
    /// Returns `false` without touching anything if this attempt already
    /// armed them. Both timers first fire one full period from now.
    pub fn arm(&mut self, outgoing: Option<Duration>, incoming: Option<Duration>) -> bool {
        if self.armed {
            return false;
        }
        self.armed = true;
        let now = Instant::now();
        self.outgoing = outgoing.map(|period| periodic(now, period));
        self.watchdog = incoming.map(|period| periodic(now, period));
        self.outgoing_period = outgoing;
        self.incoming_period = incoming;
        true
    }

    /// Drop both timers. Safe to call any number of times.
    pub fn cancel(&mut self) {
        self.outgoing = None;
        self.watchdog = None;
    }

    /// Cancel and forget the previous attempt so the next one can arm again.
    pub fn reset(&mut self) {
        self.cancel();
        self.armed = false;
        self.outgoing_period = None;
        self.incoming_period = None;
        self.last_activity = Instant::now();
    }

    /// True while at least one timer is live.
    pub fn is_active(&self) -> bool {
        self.outgoing.is_some() || self.watchdog.is_some()
    }

    /// Negotiated outgoing period of the current attempt, if enabled.
    pub fn outgoing_period(&self) -> Option<Duration> {
        self.outgoing_period
    }

    /// Negotiated incoming period of the current attempt, if enabled.
    pub fn incoming_period(&self) -> Option<Duration> {
        self.incoming_period
    }

    /// Note that something arrived from the server.
    pub fn record_activity(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Time since the last recorded server activity.
    pub fn silence(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    /// Silence allowed before the server is considered dead.
    pub fn tolerance(&self) -> Option<Duration> {
        self.incoming_period.map(|period| period * 2)
    }

    /// True if the server has been silent for more than twice the
    /// negotiated incoming interval. Always false when the watchdog is off.
    pub fn is_stale(&self, now: Instant) -> bool {
        match (self.watchdog.as_ref(), self.tolerance()) {
            (Some(_), Some(limit)) => self.silence(now) > limit,
            _ => false,
        }
    }

    /// Wait for the next timer to fire.
    pub async fn tick(&mut self) -> HeartbeatTick {
        match (self.outgoing.as_mut(), self.watchdog.as_mut()) {
            (None, None) => future::pending().await,
            (Some(out), None) => {
                out.tick().await;
                HeartbeatTick::Ping
            }
            (None, Some(watchdog)) => {
                watchdog.tick().await;
                HeartbeatTick::Check
            }
            (Some(out), Some(watchdog)) => tokio::select! {
                _ = out.tick() => HeartbeatTick::Ping,
                _ = watchdog.tick() => HeartbeatTick::Check,
            },
        }
    }
}

impl Default for HeartbeatMonitor {
    fn default() -> Self {
        Self::new()
    }
}

fn periodic(now: Instant, period: Duration) -> Interval {
    let mut timer = interval_at(now + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn arm_is_once_per_attempt() {
        let mut hb = HeartbeatMonitor::new();
        assert!(hb.arm(Some(Duration::from_secs(1)), None));
        assert!(!hb.arm(None, Some(Duration::from_secs(5))));
        assert_eq!(hb.outgoing_period(), Some(Duration::from_secs(1)));
        assert_eq!(hb.incoming_period(), None);

        hb.reset();
        assert!(hb.arm(None, Some(Duration::from_secs(5))));
        assert_eq!(hb.incoming_period(), Some(Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn ping_fires_after_one_period() {
        let mut hb = HeartbeatMonitor::new();
        hb.arm(Some(Duration::from_millis(100)), None);
        let start = Instant::now();
        assert_eq!(hb.tick().await, HeartbeatTick::Ping);
        assert_eq!(start.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_only_past_twice_incoming() {
        let mut hb = HeartbeatMonitor::new();
        hb.arm(None, Some(Duration::from_millis(100)));
        tokio::time::advance(Duration::from_millis(200)).await;
        assert!(!hb.is_stale(Instant::now()));
        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(hb.is_stale(Instant::now()));
        hb.record_activity();
        assert!(!hb.is_stale(Instant::now()));
    }
}
