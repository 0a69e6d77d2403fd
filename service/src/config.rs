//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Configuration types and builders for servers and clients
//!
//! # Examples
//!
//! ```
//! use socknet_service::{ServerConfig, HeartbeatConfig};
//! use std::time::Duration;
//!
//! let config = ServerConfig::new("127.0.0.1:7000".parse().unwrap())
//!     .with_websocket(true)
//!     .with_heartbeat(
//!         HeartbeatConfig::default()
//!             .with_ttl(Duration::from_secs(30))
//!             .with_sweep_interval(Duration::from_secs(5)),
//!     );
//! ```

use crate::tls::TlsSettings;
use socknet_wscodec::DEFAULT_MAX_FRAME_SIZE;
use std::net::SocketAddr;
use std::time::Duration;

/// Heartbeat liveness configuration
///
/// A connection's liveness token is renewed on every successful receive
/// and expires `ttl` after the last renewal. One process-wide sweep task
/// evicts expired connections every `sweep_interval`, so the worst-case
/// lifetime of a dead connection is `ttl + sweep_interval`.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Time-to-live of a liveness token after its last renewal
    pub ttl: Duration,
    /// Interval between sweep ticks
    pub sweep_interval: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(10),
        }
    }
}

impl HeartbeatConfig {
    /// Set the liveness token TTL
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the sweep interval
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}

/// Admission control configuration
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    /// Token bucket capacity per client identity
    pub capacity: u32,
    /// Tokens refilled per second
    pub refill_per_sec: f64,
    /// Maximum number of tracked buckets before LRU eviction
    pub max_buckets: usize,
    /// Maximum simultaneous live connections per client identity
    pub max_connections_per_ip: usize,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            capacity: 6,
            refill_per_sec: 6.0,
            max_buckets: 4096,
            max_connections_per_ip: 20,
        }
    }
}

impl LimiterConfig {
    /// Set the bucket capacity
    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the refill rate in tokens per second
    pub fn with_refill_per_sec(mut self, rate: f64) -> Self {
        self.refill_per_sec = rate;
        self
    }

    /// Set the bound on tracked buckets
    pub fn with_max_buckets(mut self, max: usize) -> Self {
        self.max_buckets = max;
        self
    }

    /// Set the per-identity live connection bound
    pub fn with_max_connections_per_ip(mut self, max: usize) -> Self {
        self.max_connections_per_ip = max;
        self
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the TCP listener to
    pub bind_address: SocketAddr,
    /// Maximum simultaneous connections
    pub max_connections: usize,
    /// Default deadline for length-bounded receives
    pub recv_timeout: Duration,
    /// Read timeout in the worker loop (max time to wait for traffic)
    pub read_timeout: Duration,
    /// Write timeout for send operations
    pub write_timeout: Duration,
    /// Heartbeat liveness settings
    pub heartbeat: HeartbeatConfig,
    /// Admission control settings
    pub limiter: LimiterConfig,
    /// TLS settings (None for plaintext)
    pub tls: Option<TlsSettings>,
    /// Upgrade accepted connections to WebSocket
    pub websocket: bool,
    /// Maximum accepted WebSocket frame payload length
    pub max_frame_size: usize,
}

impl ServerConfig {
    /// Create a server configuration binding to the given address
    pub fn new(bind_address: SocketAddr) -> Self {
        Self {
            bind_address,
            max_connections: 1024,
            recv_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_secs(300),
            write_timeout: Duration::from_secs(30),
            heartbeat: HeartbeatConfig::default(),
            limiter: LimiterConfig::default(),
            tls: None,
            websocket: false,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Set the connection limit
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the default length-bounded receive deadline
    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }

    /// Set the worker read timeout
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the worker write timeout
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the heartbeat settings
    pub fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Set the admission control settings
    pub fn with_limiter(mut self, limiter: LimiterConfig) -> Self {
        self.limiter = limiter;
        self
    }

    /// Enable TLS with the given settings
    pub fn with_tls(mut self, tls: TlsSettings) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Enable or disable the WebSocket upgrade on accepted connections
    pub fn with_websocket(mut self, enabled: bool) -> Self {
        self.websocket = enabled;
        self
    }

    /// Set the maximum accepted frame payload length
    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server hostname or IP address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Default deadline for length-bounded receives
    pub recv_timeout: Duration,
    /// TLS settings (None for plaintext)
    pub tls: Option<TlsSettings>,
    /// Upgrade the connection to WebSocket after connecting
    pub websocket: bool,
    /// Request path for the WebSocket upgrade
    pub ws_path: String,
    /// Maximum accepted WebSocket frame payload length
    pub max_frame_size: usize,
}

impl ClientConfig {
    /// Create a client configuration for the given host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: Duration::from_secs(10),
            recv_timeout: Duration::from_secs(2),
            tls: None,
            websocket: false,
            ws_path: "/".to_string(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Set the connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the default length-bounded receive deadline
    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }

    /// Enable TLS with the given settings
    pub fn with_tls(mut self, tls: TlsSettings) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Enable the WebSocket upgrade with the given request path
    pub fn with_websocket(mut self, path: impl Into<String>) -> Self {
        self.websocket = true;
        self.ws_path = path.into();
        self
    }

    /// Set the maximum accepted frame payload length
    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }

    /// Get the server address as a string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
