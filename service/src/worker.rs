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

//! Connection worker implementation
//!
//! The ConnectionWorker owns the lifecycle of a single connection:
//! the message loop, timeout management, control message handling,
//! liveness renewal, and resource cleanup. Every successful receive
//! renews the connection's heartbeat token; a sweep eviction arrives
//! as a `Close` control message, which cancels any receive in flight.

use crate::connection::Connection;
use crate::error::{NetError, Result};
use crate::handler::ServerHandler;
use crate::heartbeat::Heartbeat;
use crate::limiter::RateLimiter;
use crate::types::{ConnectionId, ConnectionState};
use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

/// Control messages for the worker
#[derive(Debug)]
pub enum ControlMessage {
    /// Gracefully close the connection
    Close,
    /// Send a message to the connection
    Send(Bytes),
    /// Broadcast message (sent to all connections, best effort)
    Broadcast(Bytes),
}

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Read timeout (max time to wait for data)
    pub read_timeout: Duration,
    /// Idle timeout (max time without activity)
    pub idle_timeout: Duration,
    /// Write timeout (max time for send operations)
    pub write_timeout: Duration,
    /// Control channel buffer size
    pub control_buffer_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(300),
            idle_timeout: Duration::from_secs(600),
            write_timeout: Duration::from_secs(30),
            control_buffer_size: 100,
        }
    }
}

/// Connection worker that manages a single connection's lifecycle
pub struct ConnectionWorker {
    /// Connection ID
    id: ConnectionId,
    /// The connection being managed
    connection: Connection,
    /// Event handler
    handler: Arc<dyn ServerHandler>,
    /// Configuration
    config: WorkerConfig,
    /// Current state (atomic for lock-free access)
    state: Arc<AtomicU8>,
    /// Control message receiver
    control_rx: mpsc::Receiver<ControlMessage>,
    /// Liveness table this connection is registered in
    heartbeat: Arc<Heartbeat>,
    /// Limiter holding this connection's live slot
    limiter: Arc<RateLimiter>,
    /// Last activity timestamp
    last_activity: Instant,
}

impl ConnectionWorker {
    /// Create a new connection worker
    pub fn new(
        id: ConnectionId,
        connection: Connection,
        handler: Arc<dyn ServerHandler>,
        config: WorkerConfig,
        state: Arc<AtomicU8>,
        heartbeat: Arc<Heartbeat>,
        limiter: Arc<RateLimiter>,
    ) -> (Self, mpsc::Sender<ControlMessage>) {
        let (control_tx, control_rx) = mpsc::channel(config.control_buffer_size);

        let worker = Self {
            id,
            connection,
            handler,
            config,
            state,
            control_rx,
            heartbeat,
            limiter,
            last_activity: Instant::now(),
        };

        (worker, control_tx)
    }

    /// Get the current state
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, new_state: ConnectionState) {
        self.state.store(new_state.as_u8(), Ordering::Release);
    }

    fn update_activity(&mut self) {
        self.last_activity = Instant::now();
    }

    fn is_idle(&self) -> bool {
        self.last_activity.elapsed() > self.config.idle_timeout
    }

    /// Poll granularity for idle checks, derived from the idle deadline
    fn idle_poll_interval(&self) -> Duration {
        (self.config.idle_timeout / 6).max(Duration::from_millis(100))
    }

    /// Run the worker event loop
    ///
    /// This is the main entry point for the worker. It will run until
    /// the connection is closed, evicted, or an error occurs.
    pub async fn run(mut self) {
        self.set_state(ConnectionState::Active);

        self.handler.on_connect(self.id, &self.connection).await;

        let result = self.event_loop().await;

        if let Err(e) = result {
            self.handler.on_error(self.id, &self.connection, e).await;
        }

        self.cleanup().await;
    }

    /// Main message processing loop
    async fn event_loop(&mut self) -> Result<()> {
        loop {
            if self.is_idle() {
                self.handler
                    .on_idle_timeout(self.id, &self.connection)
                    .await;
                return Err(NetError::Timeout);
            }

            let idle_poll = self.idle_poll_interval();
            select! {
                // Handle incoming messages from the connection
                result = timeout(self.config.read_timeout, self.connection.next()) => {
                    match result {
                        Ok(Ok(Some(message))) => {
                            self.update_activity();
                            self.set_state(ConnectionState::Active);
                            // Traffic proves liveness
                            self.heartbeat.renew(self.id);
                            self.handler.on_message(self.id, &self.connection, message).await;
                        }
                        Ok(Ok(None)) => {
                            // Connection closed by peer
                            return Ok(());
                        }
                        Ok(Err(e)) => {
                            return Err(e);
                        }
                        Err(_) => {
                            // Read timeout
                            self.handler.on_timeout(self.id, &self.connection).await;
                            return Err(NetError::Timeout);
                        }
                    }
                }

                // Handle control messages
                msg = self.control_rx.recv() => {
                    match msg {
                        Some(ControlMessage::Close) => {
                            // Graceful close or sweep eviction
                            return Ok(());
                        }
                        Some(ControlMessage::Send(data)) => {
                            match timeout(
                                self.config.write_timeout,
                                self.connection.send(&data)
                            ).await {
                                Ok(result) => result?,
                                Err(_) => return Err(NetError::Timeout),
                            }
                            self.update_activity();
                        }
                        Some(ControlMessage::Broadcast(data)) => {
                            // Best effort, don't fail the connection on error
                            let _ = timeout(
                                self.config.write_timeout,
                                self.connection.send(&data)
                            ).await;
                            self.update_activity();
                        }
                        None => {
                            // Control channel closed, shutdown
                            return Ok(());
                        }
                    }
                }

                // Check for idle state transition
                _ = sleep(idle_poll) => {
                    if self.last_activity.elapsed() > self.config.idle_timeout / 2 {
                        self.set_state(ConnectionState::Idle);
                    }
                }
            }
        }
    }

    /// Cleanup resources
    async fn cleanup(&mut self) {
        self.set_state(ConnectionState::Closing);

        self.handler.on_disconnect(self.id, &self.connection).await;

        // Release the liveness entry and the per-client live slot
        self.heartbeat.deregister(self.id);
        self.limiter
            .release_connection(self.connection.peer_addr().ip());

        let _ = self.connection.close().await;

        // Drain any remaining control messages
        while self.control_rx.try_recv().is_ok() {}

        self.set_state(ConnectionState::Closed);
    }
}

impl std::fmt::Debug for ConnectionWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionWorker")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("last_activity", &self.last_activity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LimiterConfig;
    use crate::tls::MaybeTlsStream;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};

    struct TestHandler {
        connected: AtomicBool,
        disconnected: AtomicBool,
        idle_timed_out: AtomicBool,
        message_count: AtomicUsize,
        error_count: AtomicUsize,
    }

    impl TestHandler {
        fn new() -> Self {
            Self {
                connected: AtomicBool::new(false),
                disconnected: AtomicBool::new(false),
                idle_timed_out: AtomicBool::new(false),
                message_count: AtomicUsize::new(0),
                error_count: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ServerHandler for TestHandler {
        async fn on_connect(&self, _id: ConnectionId, _conn: &Connection) {
            self.connected.store(true, Ordering::SeqCst);
        }

        async fn on_message(&self, _id: ConnectionId, _conn: &Connection, _message: Bytes) {
            self.message_count.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_error(&self, _id: ConnectionId, _conn: &Connection, _error: NetError) {
            self.error_count.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_idle_timeout(&self, _id: ConnectionId, _conn: &Connection) {
            self.idle_timed_out.store(true, Ordering::SeqCst);
        }

        async fn on_disconnect(&self, _id: ConnectionId, _conn: &Connection) {
            self.disconnected.store(true, Ordering::SeqCst);
        }
    }

    async fn create_test_connection() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client_task = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });

        let (server, _) = listener.accept().await.unwrap();
        let client = client_task.await.unwrap();

        (server, client)
    }

    fn spawn_worker(
        server: TcpStream,
        handler: Arc<TestHandler>,
        heartbeat: Arc<Heartbeat>,
        limiter: Arc<RateLimiter>,
    ) -> (
        tokio::task::JoinHandle<()>,
        mpsc::Sender<ControlMessage>,
        ConnectionId,
    ) {
        let id = ConnectionId::new(1);
        let peer_addr = server.peer_addr().unwrap();
        let connection = Connection::tcp(
            MaybeTlsStream::Plain(server),
            id,
            peer_addr,
            Duration::from_secs(2),
        );
        heartbeat.register(id);
        let state = Arc::new(AtomicU8::new(ConnectionState::Connecting.as_u8()));
        let (worker, control_tx) = ConnectionWorker::new(
            id,
            connection,
            handler,
            WorkerConfig::default(),
            state,
            heartbeat,
            limiter,
        );
        let task = tokio::spawn(async move { worker.run().await });
        (task, control_tx, id)
    }

    #[tokio::test]
    async fn test_worker_lifecycle_and_cleanup() {
        let (server, client) = create_test_connection().await;
        let handler = Arc::new(TestHandler::new());
        let heartbeat = Arc::new(Heartbeat::new(Duration::from_secs(60)));
        let limiter = Arc::new(RateLimiter::new(LimiterConfig::default()));

        let (task, control_tx, id) =
            spawn_worker(server, handler.clone(), heartbeat.clone(), limiter.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handler.connected.load(Ordering::SeqCst));
        assert!(heartbeat.contains(id));

        control_tx.send(ControlMessage::Close).await.unwrap();
        drop(control_tx);
        task.await.unwrap();

        assert!(handler.disconnected.load(Ordering::SeqCst));
        // Cleanup must release the liveness entry
        assert!(!heartbeat.contains(id));

        drop(client);
    }

    #[tokio::test]
    async fn test_worker_delivers_messages() {
        let (server, mut client) = create_test_connection().await;
        let handler = Arc::new(TestHandler::new());
        let heartbeat = Arc::new(Heartbeat::new(Duration::from_secs(60)));
        let limiter = Arc::new(RateLimiter::new(LimiterConfig::default()));

        let (task, control_tx, _id) =
            spawn_worker(server, handler.clone(), heartbeat.clone(), limiter.clone());

        client.write_all(b"hello worker").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handler.message_count.load(Ordering::SeqCst) >= 1);

        control_tx.send(ControlMessage::Close).await.unwrap();
        drop(control_tx);
        task.await.unwrap();
        drop(client);
    }

    #[tokio::test]
    async fn test_outbound_send_preserves_split_inbound_frame() {
        use crate::session::WebSocketSession;
        use bytes::BytesMut;
        use socknet_wscodec::{WebSocketCodec, WsFrame, WsRole};
        use tokio_util::codec::Encoder;

        let (server, client) = create_test_connection().await;
        let peer_addr = server.peer_addr().unwrap();

        let (server_session, client_session) = tokio::join!(
            WebSocketSession::accept(MaybeTlsStream::Plain(server), 1 << 20),
            WebSocketSession::connect(MaybeTlsStream::Plain(client), "localhost", "/", 1 << 20),
        );

        let id = ConnectionId::new(1);
        let connection = Connection::websocket(server_session.unwrap(), id, peer_addr, false);
        let handler = Arc::new(TestHandler::new());
        let heartbeat = Arc::new(Heartbeat::new(Duration::from_secs(60)));
        let limiter = Arc::new(RateLimiter::new(LimiterConfig::default()));
        heartbeat.register(id);
        let state = Arc::new(AtomicU8::new(ConnectionState::Connecting.as_u8()));
        let (worker, control_tx) = ConnectionWorker::new(
            id,
            connection,
            handler.clone(),
            WorkerConfig::default(),
            state,
            heartbeat,
            limiter,
        );
        let task = tokio::spawn(async move { worker.run().await });

        let mut raw = client_session.unwrap().into_inner();

        // A masked text frame split across two writes, with an outbound
        // control send landing while the first half is pending
        let mut codec = WebSocketCodec::new(WsRole::Client);
        let mut wire = BytesMut::new();
        codec.encode(WsFrame::text("hello"), &mut wire).unwrap();
        let tail = wire.split_off(4);

        raw.write_all(&wire).await.unwrap();
        raw.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        control_tx
            .send(ControlMessage::Send(Bytes::from_static(b"status")))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        raw.write_all(&tail).await.unwrap();
        raw.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        // The split frame must arrive intact despite the interleaved send
        assert_eq!(handler.message_count.load(Ordering::SeqCst), 1);
        assert_eq!(handler.error_count.load(Ordering::SeqCst), 0);

        control_tx.send(ControlMessage::Close).await.unwrap();
        drop(control_tx);
        task.await.unwrap();
        drop(raw);
    }

    #[tokio::test]
    async fn test_idle_deadline_derived_from_config() {
        let (server, client) = create_test_connection().await;
        let handler = Arc::new(TestHandler::new());
        let heartbeat = Arc::new(Heartbeat::new(Duration::from_secs(60)));
        let limiter = Arc::new(RateLimiter::new(LimiterConfig::default()));

        let id = ConnectionId::new(1);
        let peer_addr = server.peer_addr().unwrap();
        let connection = Connection::tcp(
            MaybeTlsStream::Plain(server),
            id,
            peer_addr,
            Duration::from_secs(2),
        );
        heartbeat.register(id);
        let state = Arc::new(AtomicU8::new(ConnectionState::Connecting.as_u8()));
        let config = WorkerConfig {
            idle_timeout: Duration::from_millis(400),
            ..WorkerConfig::default()
        };
        let (worker, _control_tx) = ConnectionWorker::new(
            id,
            connection,
            handler.clone(),
            config,
            state,
            heartbeat.clone(),
            limiter,
        );
        let task = tokio::spawn(async move { worker.run().await });

        // No traffic: the configured idle deadline ends the worker
        tokio::time::sleep(Duration::from_millis(900)).await;
        assert!(task.is_finished());
        task.await.unwrap();

        assert!(handler.idle_timed_out.load(Ordering::SeqCst));
        assert!(handler.disconnected.load(Ordering::SeqCst));
        assert!(!heartbeat.contains(id));
        drop(client);
    }

    #[tokio::test]
    async fn test_worker_peer_close_ends_loop() {
        let (server, client) = create_test_connection().await;
        let handler = Arc::new(TestHandler::new());
        let heartbeat = Arc::new(Heartbeat::new(Duration::from_secs(60)));
        let limiter = Arc::new(RateLimiter::new(LimiterConfig::default()));

        let (task, _control_tx, id) =
            spawn_worker(server, handler.clone(), heartbeat.clone(), limiter.clone());

        drop(client);
        task.await.unwrap();

        assert!(handler.disconnected.load(Ordering::SeqCst));
        assert!(!heartbeat.contains(id));
    }
}
