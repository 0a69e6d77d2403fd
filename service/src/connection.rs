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

//! Server-side connection implementation
//!
//! A [`Connection`] wraps either a raw TCP descriptor handler or an
//! upgraded WebSocket session, both over a transport that may carry
//! TLS. The connection is cheap to clone and does not manage its own
//! task; task management is handled by the ConnectionWorker.

use crate::error::{NetError, Result};
use crate::fd::TcpFdHandler;
use crate::session::WebSocketSession;
use crate::tls::MaybeTlsStream;
use crate::types::{ConnectionId, TlsState, Transport};
use bytes::Bytes;
use metrics::{counter, histogram};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{error, instrument, trace};

const TCP_RECV_CHUNK: usize = 8 * 1024;

/// The I/O personality of a connection
enum IoSession {
    Tcp(TcpFdHandler<MaybeTlsStream<TcpStream>>),
    WebSocket(WebSocketSession<MaybeTlsStream<TcpStream>>),
}

impl std::fmt::Debug for IoSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp(_) => write!(f, "IoSession::Tcp"),
            Self::WebSocket(_) => write!(f, "IoSession::WebSocket"),
        }
    }
}

/// A server-side connection
#[derive(Clone)]
pub struct Connection {
    // Core I/O
    io: Arc<Mutex<IoSession>>,

    // Metadata (lock-free access)
    id: ConnectionId,
    peer_addr: SocketAddr,
    transport: Transport,
    created_at: Instant,
    tls_state: Arc<AtomicU8>,

    // Metrics (lock-free)
    bytes_sent: Arc<AtomicU64>,
    bytes_received: Arc<AtomicU64>,
    messages_sent: Arc<AtomicU64>,
    messages_received: Arc<AtomicU64>,
}

impl Connection {
    /// Wrap a raw byte stream into a TCP connection
    pub fn tcp(
        stream: MaybeTlsStream<TcpStream>,
        id: ConnectionId,
        peer_addr: SocketAddr,
        recv_timeout: Duration,
    ) -> Self {
        let tls_state = match &stream {
            MaybeTlsStream::Plain(_) => TlsState::None,
            _ => TlsState::Established,
        };
        counter!("socknet.connections.total").increment(1);
        Self::build(
            IoSession::Tcp(TcpFdHandler::new(stream).with_recv_timeout(recv_timeout)),
            id,
            peer_addr,
            Transport::Tcp,
            tls_state,
        )
    }

    /// Wrap an upgraded WebSocket session into a connection
    pub fn websocket(
        session: WebSocketSession<MaybeTlsStream<TcpStream>>,
        id: ConnectionId,
        peer_addr: SocketAddr,
        tls: bool,
    ) -> Self {
        let tls_state = if tls {
            TlsState::Established
        } else {
            TlsState::None
        };
        counter!("socknet.connections.total").increment(1);
        Self::build(
            IoSession::WebSocket(session),
            id,
            peer_addr,
            Transport::WebSocket,
            tls_state,
        )
    }

    fn build(
        io: IoSession,
        id: ConnectionId,
        peer_addr: SocketAddr,
        transport: Transport,
        tls_state: TlsState,
    ) -> Self {
        Self {
            io: Arc::new(Mutex::new(io)),
            id,
            peer_addr,
            transport,
            created_at: Instant::now(),
            tls_state: Arc::new(AtomicU8::new(tls_state.as_u8())),
            bytes_sent: Arc::new(AtomicU64::new(0)),
            bytes_received: Arc::new(AtomicU64::new(0)),
            messages_sent: Arc::new(AtomicU64::new(0)),
            messages_received: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Get the connection ID
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Get the peer address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Get the transport protocol
    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Get when the connection was created
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Get the TLS layer state
    pub fn tls_state(&self) -> TlsState {
        TlsState::from_u8(self.tls_state.load(Ordering::Acquire))
    }

    /// Set the TLS layer state
    pub fn set_tls_state(&self, state: TlsState) {
        self.tls_state.store(state.as_u8(), Ordering::Release);
    }

    /// Get bytes sent
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Get bytes received
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    /// Get messages sent
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    /// Get messages received
    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    /// Receive the next message
    ///
    /// Raw TCP connections surface whatever one receive returned;
    /// WebSocket connections surface one complete application message.
    /// Returns `None` once the peer has closed.
    #[instrument(skip(self), fields(connection_id = %self.id))]
    pub async fn next(&self) -> Result<Option<Bytes>> {
        let start = Instant::now();
        let result = match &mut *self.io.lock().await {
            IoSession::Tcp(handler) => handler.recv_some(TCP_RECV_CHUNK).await,
            IoSession::WebSocket(session) => session.next_message().await,
        };
        match result {
            Ok(Some(message)) => {
                self.messages_received.fetch_add(1, Ordering::Relaxed);
                self.bytes_received
                    .fetch_add(message.len() as u64, Ordering::Relaxed);
                counter!("socknet.messages.received").increment(1);
                histogram!("socknet.message.receive_duration")
                    .record(start.elapsed().as_secs_f64());
                trace!(bytes = message.len(), "message received");
                Ok(Some(message))
            }
            Ok(None) => {
                trace!("connection stream ended");
                Ok(None)
            }
            Err(e) => {
                counter!("socknet.errors.receive").increment(1);
                error!("error receiving message");
                Err(e)
            }
        }
    }

    /// Send a message
    ///
    /// Sent as raw bytes on TCP connections and as one binary frame on
    /// WebSocket connections.
    #[instrument(skip(self, data), fields(connection_id = %self.id))]
    pub async fn send(&self, data: &[u8]) -> Result<()> {
        let start = Instant::now();
        let result = match &mut *self.io.lock().await {
            IoSession::Tcp(handler) => handler.send_data(data).await.map(|_| ()),
            IoSession::WebSocket(session) => {
                session.send_binary(Bytes::copy_from_slice(data)).await
            }
        };
        match result {
            Ok(()) => {
                self.messages_sent.fetch_add(1, Ordering::Relaxed);
                self.bytes_sent
                    .fetch_add(data.len() as u64, Ordering::Relaxed);
                counter!("socknet.messages.sent").increment(1);
                histogram!("socknet.message.send_duration").record(start.elapsed().as_secs_f64());
                Ok(())
            }
            Err(e) => {
                counter!("socknet.errors.send").increment(1);
                error!("failed to send message");
                Err(e)
            }
        }
    }

    /// Receive exactly `len` bytes within a deadline (raw TCP only)
    ///
    /// `timeout` of `None` uses the connection's configured default.
    pub async fn recv_exact(&self, len: usize, timeout: Option<Duration>) -> Result<Bytes> {
        match &mut *self.io.lock().await {
            IoSession::Tcp(handler) => {
                let data = handler.recv_data_by_length(len, timeout).await?;
                self.messages_received.fetch_add(1, Ordering::Relaxed);
                self.bytes_received
                    .fetch_add(data.len() as u64, Ordering::Relaxed);
                Ok(data)
            }
            IoSession::WebSocket(_) => Err(NetError::Other(
                "exact-length receive is only available on raw TCP connections".to_string(),
            )),
        }
    }

    /// Close the connection
    ///
    /// WebSocket connections start the close handshake; raw TCP
    /// connections shut down the write half.
    pub async fn close(&self) -> Result<()> {
        match &mut *self.io.lock().await {
            IoSession::Tcp(handler) => handler.close().await,
            IoSession::WebSocket(session) => session.close().await,
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("transport", &self.transport)
            .field("created_at", &self.created_at)
            .finish()
    }
}
