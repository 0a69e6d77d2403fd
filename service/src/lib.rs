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

//! Connection-oriented socket service
//!
//! This crate provides an async-first TCP/UDP service layer with:
//!
//! - Length- and deadline-bounded receive primitives over TCP and UDP
//! - Optional TLS with hot certificate reload and in-place session renewal
//! - Optional WebSocket upgrade with transparent control-frame handling
//! - Heartbeat-based liveness tracking with periodic sweep eviction
//! - Token-bucket admission control and per-address connection caps
//! - Lock-free metrics and monitoring
//!
//! # Architecture
//!
//! The implementation follows a layered architecture:
//!
//! ```text
//! TcpServer
//!     ↓
//! ConnectionManager ← Heartbeat / RateLimiter
//!     ↓
//! ConnectionWorker → Connection → TcpFdHandler | WebSocketSession
//! ```
//!
//! # Example
//!
//! ```no_run
//! use socknet_service::{Connection, ConnectionId, ServerConfig, ServerHandler, TcpServer};
//! use async_trait::async_trait;
//! use bytes::Bytes;
//!
//! struct EchoHandler;
//!
//! #[async_trait]
//! impl ServerHandler for EchoHandler {
//!     async fn on_message(&self, _id: ConnectionId, conn: &Connection, message: Bytes) {
//!         let _ = conn.send(&message).await;
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::new("127.0.0.1:7000".parse()?);
//!     let mut server = TcpServer::new(config).await?;
//!     server.start(std::sync::Arc::new(EchoHandler)).await?;
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod connection;
mod error;
mod fd;
mod handler;
mod heartbeat;
mod limiter;
mod manager;
mod metrics;
mod server;
mod session;
mod tls;
mod types;
mod worker;

pub use client::TcpClient;
pub use config::{ClientConfig, HeartbeatConfig, LimiterConfig, ServerConfig};
pub use connection::Connection;
pub use error::{NetError, Result};
pub use fd::{DEFAULT_RECV_TIMEOUT, FdHandler, TcpFdHandler, UdpFdHandler};
pub use handler::ServerHandler;
pub use heartbeat::Heartbeat;
pub use limiter::RateLimiter;
pub use manager::{BroadcastResult, ConnectionManager};
pub use metrics::{MetricsSnapshot, ServerMetrics};
pub use server::TcpServer;
pub use session::{SessionInfo, SessionState, WebSocketSession};
pub use tls::{MaybeTlsStream, TlsContext, TlsSettings};
pub use types::{ConnectionId, ConnectionInfo, ConnectionState, ServerSnapshot, TlsState, Transport};
pub use worker::{ConnectionWorker, ControlMessage, WorkerConfig};
