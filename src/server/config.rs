//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::protocol::constants::{DEFAULT_MAX_FRAME_LEN, DEFAULT_PORT, DEFAULT_QUEUE_CAPACITY};

/// Broker configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Capacity of each sink's bounded queue
    pub queue_capacity: usize,

    /// Sanity limit on a single frame's payload length
    pub max_frame_len: u64,

    /// Handshake must complete within this time
    pub handshake_timeout: Duration,

    /// How long a sink task waits on its queue before looping again.
    ///
    /// Bounds how quickly an idle sink task observes shutdown; no
    /// keepalive is sent on expiry.
    pub sink_pop_timeout: Duration,

    /// Grace period for connection tasks to drain on shutdown before they
    /// are aborted
    pub shutdown_grace: Duration,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Interval between periodic broker-stats log lines
    pub stats_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_connections: 0, // Unlimited
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            handshake_timeout: Duration::from_secs(10),
            sink_pop_timeout: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(5),
            tcp_nodelay: true, // Low latency matters for live plots
            stats_interval: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the sink queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the frame length sanity limit
    pub fn max_frame_len(mut self, len: u64) -> Self {
        self.max_frame_len = len;
        self
    }

    /// Set the handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the sink pop timeout
    pub fn sink_pop_timeout(mut self, timeout: Duration) -> Self {
        self.sink_pop_timeout = timeout;
        self
    }

    /// Set the shutdown grace period
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}
