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

//! TCP server implementation
//!
//! The TcpServer is the main entry point on the accepting side. It
//! manages the TCP listener and coordinates admission control, the
//! optional TLS handshake, the optional WebSocket upgrade, the
//! ConnectionManager, and the liveness sweep task.

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::error::{NetError, Result};
use crate::handler::ServerHandler;
use crate::heartbeat::Heartbeat;
use crate::limiter::RateLimiter;
use crate::manager::ConnectionManager;
use crate::metrics::ServerMetrics;
use crate::session::WebSocketSession;
use crate::tls::{MaybeTlsStream, TlsContext};
use crate::types::ServerSnapshot;
use crate::worker::WorkerConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Connection-oriented TCP server
///
/// Accepts connections, runs them through admission control and the
/// configured handshakes, and hands them to per-connection workers. A
/// single sweep task evicts connections whose liveness TTL has lapsed.
///
/// # Example
///
/// ```no_run
/// use socknet_service::{ServerConfig, ServerHandler, TcpServer};
/// use async_trait::async_trait;
///
/// struct MyHandler;
///
/// #[async_trait]
/// impl ServerHandler for MyHandler {}
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ServerConfig::new("127.0.0.1:7000".parse().unwrap());
///     let server = TcpServer::new(config).await?;
///
///     server.start(std::sync::Arc::new(MyHandler)).await?;
///
///     // Server is now running, wait for shutdown signal
///     // tokio::signal::ctrl_c().await?;
///     server.shutdown().await?;
///
///     Ok(())
/// }
/// ```
pub struct TcpServer {
    /// Server configuration
    config: ServerConfig,
    /// Connection manager
    manager: Arc<ConnectionManager>,
    /// Server metrics
    metrics: Arc<ServerMetrics>,
    /// Admission limiter
    limiter: Arc<RateLimiter>,
    /// TLS context (None for plaintext)
    tls: Option<Arc<TlsContext>>,
    /// TCP listener (wrapped for sharing with the accept loop)
    listener: Arc<tokio::sync::Mutex<TcpListener>>,
    /// Actual bind address
    bind_address: SocketAddr,
    /// Server start time
    started_at: Instant,
    /// Running flag
    running: Arc<AtomicBool>,
    /// Shutdown notification
    shutdown_notify: Arc<Notify>,
    /// Accept loop task handle
    accept_handle: Arc<tokio::sync::Mutex<Option<JoinHandle<()>>>>,
    /// Liveness sweep task handle
    sweeper_handle: Arc<tokio::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl TcpServer {
    /// Create a new server with the given configuration
    ///
    /// This binds to the configured address but does not start
    /// accepting connections. Call `start()` to begin accepting.
    pub async fn new(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_address).await?;
        let actual_addr = listener.local_addr()?;

        let metrics = Arc::new(ServerMetrics::new());
        let heartbeat = Arc::new(Heartbeat::new(config.heartbeat.ttl));
        let limiter = Arc::new(RateLimiter::new(config.limiter.clone()));

        let tls = match &config.tls {
            Some(settings) => Some(Arc::new(TlsContext::server(settings.clone())?)),
            None => None,
        };

        let worker_config = WorkerConfig {
            read_timeout: config.read_timeout,
            idle_timeout: config.read_timeout * 2,
            write_timeout: config.write_timeout,
            control_buffer_size: 100,
        };

        let manager = Arc::new(ConnectionManager::new(
            metrics.clone(),
            heartbeat,
            limiter.clone(),
            worker_config,
        ));

        info!("server bound to {}", actual_addr);

        Ok(Self {
            config,
            manager,
            metrics,
            limiter,
            tls,
            listener: Arc::new(tokio::sync::Mutex::new(listener)),
            bind_address: actual_addr,
            started_at: Instant::now(),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_notify: Arc::new(Notify::new()),
            accept_handle: Arc::new(tokio::sync::Mutex::new(None)),
            sweeper_handle: Arc::new(tokio::sync::Mutex::new(None)),
        })
    }

    /// Start the server with the given handler
    ///
    /// This begins accepting connections and starts the liveness sweep.
    /// The server runs until `shutdown()` is called.
    pub async fn start(&self, handler: Arc<dyn ServerHandler>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(NetError::Other("server already running".to_string()));
        }

        info!("starting server on {}", self.bind_address);

        let sweeper = self
            .manager
            .spawn_sweeper(self.config.heartbeat.sweep_interval);
        *self.sweeper_handle.lock().await = Some(sweeper);

        let handle = self.spawn_accept_loop(handler).await;
        *self.accept_handle.lock().await = Some(handle);

        Ok(())
    }

    /// Spawn the accept loop task
    async fn spawn_accept_loop(&self, handler: Arc<dyn ServerHandler>) -> JoinHandle<()> {
        let listener = self.listener.clone();
        let manager = self.manager.clone();
        let metrics = self.metrics.clone();
        let limiter = self.limiter.clone();
        let tls = self.tls.clone();
        let config = self.config.clone();
        let running = self.running.clone();
        let shutdown_notify = self.shutdown_notify.clone();

        tokio::spawn(async move {
            loop {
                if !running.load(Ordering::SeqCst) {
                    break;
                }

                let accept_result = tokio::select! {
                    result = async {
                        listener.lock().await.accept().await
                    } => result,
                    _ = shutdown_notify.notified() => break,
                };

                match accept_result {
                    Ok((socket, peer_addr)) => {
                        debug!("accepted connection from {}", peer_addr);

                        // Admission: connection rate per client
                        if !limiter.allow(peer_addr.ip()) {
                            warn!("rate limit exceeded, rejecting {}", peer_addr);
                            metrics.connection_rate_limited();
                            drop(socket);
                            continue;
                        }

                        // Admission: simultaneous connections per client
                        if !limiter.register_connection(peer_addr.ip()) {
                            warn!("per-client connection cap, rejecting {}", peer_addr);
                            metrics.connection_rate_limited();
                            drop(socket);
                            continue;
                        }

                        // Admission: global connection limit
                        if manager.connection_count() >= config.max_connections {
                            warn!(
                                "connection limit reached ({}), rejecting {}",
                                config.max_connections, peer_addr
                            );
                            metrics.connection_error();
                            limiter.release_connection(peer_addr.ip());
                            drop(socket);
                            continue;
                        }

                        // Handshakes run in their own task so a slow
                        // client cannot stall the accept loop.
                        let manager = manager.clone();
                        let metrics = metrics.clone();
                        let limiter = limiter.clone();
                        let tls = tls.clone();
                        let config = config.clone();
                        let handler = handler.clone();
                        tokio::spawn(async move {
                            match establish(socket, peer_addr, &manager, tls, &config).await {
                                Ok(connection) => {
                                    let id = connection.id();
                                    match manager.add_connection(connection, handler) {
                                        Ok(_) => {
                                            info!(
                                                "connection {} established from {}",
                                                id, peer_addr
                                            );
                                        }
                                        Err(e) => {
                                            error!("failed to add connection: {}", e);
                                            metrics.connection_error();
                                            limiter.release_connection(peer_addr.ip());
                                        }
                                    }
                                }
                                Err(e) => {
                                    if e.is_tls_error() {
                                        metrics.tls_error();
                                    } else {
                                        metrics.connection_error();
                                    }
                                    warn!("handshake with {} failed: {}", peer_addr, e);
                                    limiter.release_connection(peer_addr.ip());
                                }
                            }
                        });
                    }
                    Err(e) => {
                        error!("failed to accept connection: {}", e);
                        metrics.connection_error();

                        // Back off on errors to avoid a tight loop
                        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    }
                }
            }

            info!("accept loop terminated");
        })
    }

    /// Shutdown the server gracefully
    ///
    /// This stops accepting new connections, stops the liveness sweep,
    /// and closes existing connections.
    pub async fn shutdown(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(NetError::ServerNotRunning);
        }

        info!("shutting down server");

        self.shutdown_notify.notify_waiters();

        if let Some(handle) = self.accept_handle.lock().await.take() {
            let _ = tokio::time::timeout(std::time::Duration::from_secs(5), handle).await;
        }
        if let Some(handle) = self.sweeper_handle.lock().await.take() {
            handle.abort();
        }

        self.manager.shutdown().await;

        info!("server shutdown complete");

        Ok(())
    }

    /// Rebuild the TLS configuration from the certificate files on disk
    ///
    /// Live sessions keep their parameters; handshakes after the call
    /// use the rotated certificate.
    pub fn reload_tls(&self) -> Result<()> {
        match &self.tls {
            Some(ctx) => ctx.reload(),
            None => Err(NetError::TlsHandshakeFailed(
                "server has no TLS context".to_string(),
            )),
        }
    }

    /// The server's TLS context, if TLS is enabled
    pub fn tls_context(&self) -> Option<Arc<TlsContext>> {
        self.tls.clone()
    }

    /// Check if the server is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the server's bind address
    pub fn bind_address(&self) -> SocketAddr {
        self.bind_address
    }

    /// Get the number of active connections
    pub fn connection_count(&self) -> usize {
        self.manager.connection_count()
    }

    /// Get a snapshot of the server state
    pub fn snapshot(&self) -> ServerSnapshot {
        ServerSnapshot {
            active_connections: self.manager.connection_count(),
            total_connections: self.metrics.total_connections(),
            evicted_connections: self.metrics.evicted_connections(),
            bind_address: self.bind_address(),
            uptime: self.started_at.elapsed(),
            started_at: self.started_at,
        }
    }

    /// Get the server metrics
    pub fn metrics(&self) -> Arc<ServerMetrics> {
        self.metrics.clone()
    }

    /// Get the connection manager
    pub fn manager(&self) -> Arc<ConnectionManager> {
        self.manager.clone()
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Run the optional TLS and WebSocket handshakes on an admitted socket
async fn establish(
    socket: TcpStream,
    peer_addr: SocketAddr,
    manager: &ConnectionManager,
    tls: Option<Arc<TlsContext>>,
    config: &ServerConfig,
) -> Result<Connection> {
    let has_tls = tls.is_some();
    let stream = match tls {
        Some(ctx) => MaybeTlsStream::ServerTls(Box::new(ctx.accept(socket).await?)),
        None => MaybeTlsStream::Plain(socket),
    };

    let id = manager.next_connection_id();
    if config.websocket {
        let session = WebSocketSession::accept(stream, config.max_frame_size).await?;
        Ok(Connection::websocket(session, id, peer_addr, has_tls))
    } else {
        Ok(Connection::tcp(stream, id, peer_addr, config.recv_timeout))
    }
}

impl std::fmt::Debug for TcpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpServer")
            .field("bind_address", &self.bind_address())
            .field("running", &self.is_running())
            .field("connection_count", &self.connection_count())
            .field("uptime", &self.started_at.elapsed())
            .finish()
    }
}

// Implement Drop to ensure cleanup
impl Drop for TcpServer {
    fn drop(&mut self) {
        if self.running.load(Ordering::SeqCst) {
            warn!("TcpServer dropped while still running");
            self.running.store(false, Ordering::SeqCst);
            self.shutdown_notify.notify_waiters();
        }
    }
}
