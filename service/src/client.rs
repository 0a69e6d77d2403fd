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

//! TCP client implementation
//!
//! The TcpClient is the initiating counterpart of the server: it
//! connects with a bounded deadline, optionally wraps the transport in
//! TLS, optionally upgrades to WebSocket, and exposes the same send
//! and receive shapes the server side uses. There is no automatic
//! reconnection; a closed client stays closed.

use crate::config::ClientConfig;
use crate::error::{NetError, Result};
use crate::fd::TcpFdHandler;
use crate::session::WebSocketSession;
use crate::tls::{MaybeTlsStream, TlsContext, TlsSettings};
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, info};

const TCP_RECV_CHUNK: usize = 8 * 1024;

enum ClientIo {
    Tcp(TcpFdHandler<MaybeTlsStream<TcpStream>>),
    WebSocket(WebSocketSession<MaybeTlsStream<TcpStream>>),
}

/// Connection-oriented TCP client
///
/// # Example
///
/// ```no_run
/// use socknet_service::{ClientConfig, TcpClient};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ClientConfig::new("127.0.0.1", 7000);
///     let mut client = TcpClient::connect(config).await?;
///
///     client.send(b"hello").await?;
///     if let Some(reply) = client.recv().await? {
///         println!("reply: {:?}", reply);
///     }
///
///     client.close().await?;
///     Ok(())
/// }
/// ```
pub struct TcpClient {
    config: ClientConfig,
    tls: Option<Arc<TlsContext>>,
    io: Option<ClientIo>,
    peer_addr: SocketAddr,
}

impl TcpClient {
    /// Connect to the configured server
    ///
    /// Runs the TCP connect, the optional TLS handshake, and the
    /// optional WebSocket upgrade, each bounded by its deadline.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let tls = match &config.tls {
            Some(settings) => {
                // The handshake needs a name to verify; default to the
                // host we are dialing.
                let mut settings: TlsSettings = settings.clone();
                if settings.server_name.is_none() {
                    settings.server_name = Some(config.host.clone());
                }
                Some(Arc::new(TlsContext::client(settings)?))
            }
            None => None,
        };

        let address = config.address();
        let socket = match tokio::time::timeout(
            config.connect_timeout,
            TcpStream::connect(&address),
        )
        .await
        {
            Ok(Ok(socket)) => socket,
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => return Err(NetError::Timeout),
        };
        let peer_addr = socket.peer_addr()?;
        debug!(peer = %peer_addr, "tcp connected");

        let stream = match &tls {
            Some(ctx) => MaybeTlsStream::ClientTls(Box::new(ctx.connect(socket).await?)),
            None => MaybeTlsStream::Plain(socket),
        };

        let io = if config.websocket {
            let session = WebSocketSession::connect(
                stream,
                &config.host,
                &config.ws_path,
                config.max_frame_size,
            )
            .await?;
            ClientIo::WebSocket(session)
        } else {
            ClientIo::Tcp(TcpFdHandler::new(stream).with_recv_timeout(config.recv_timeout))
        };

        info!(peer = %peer_addr, websocket = config.websocket, "client connected");

        Ok(Self {
            config,
            tls,
            io: Some(io),
            peer_addr,
        })
    }

    /// Whether the client still holds a usable connection
    pub fn is_connected(&self) -> bool {
        self.io.is_some()
    }

    /// The connected peer address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// The client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The client's TLS context, if TLS is enabled
    pub fn tls_context(&self) -> Option<Arc<TlsContext>> {
        self.tls.clone()
    }

    fn io_mut(&mut self) -> Result<&mut ClientIo> {
        self.io.as_mut().ok_or(NetError::ConnectionClosed)
    }

    /// Send a message
    ///
    /// Raw bytes on TCP, one binary frame on WebSocket.
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        match self.io_mut()? {
            ClientIo::Tcp(handler) => handler.send_data(data).await.map(|_| ()),
            ClientIo::WebSocket(session) => {
                session.send_binary(Bytes::copy_from_slice(data)).await
            }
        }
    }

    /// Receive the next message
    ///
    /// Returns `None` once the server has closed the connection.
    pub async fn recv(&mut self) -> Result<Option<Bytes>> {
        match self.io_mut()? {
            ClientIo::Tcp(handler) => handler.recv_some(TCP_RECV_CHUNK).await,
            ClientIo::WebSocket(session) => session.next_message().await,
        }
    }

    /// Receive exactly `len` bytes within a deadline (raw TCP only)
    ///
    /// `timeout` of `None` uses the configured default.
    pub async fn recv_exact(&mut self, len: usize, timeout: Option<Duration>) -> Result<Bytes> {
        match self.io_mut()? {
            ClientIo::Tcp(handler) => handler.recv_data_by_length(len, timeout).await,
            ClientIo::WebSocket(_) => Err(NetError::Other(
                "exact-length receive is only available on raw TCP connections".to_string(),
            )),
        }
    }

    /// Renew the TLS session in place
    ///
    /// Tears the TLS layer off the transport and re-runs the client
    /// handshake with the context's current configuration. Call
    /// [`TlsContext::reset_settings`] through
    /// [`tls_context`](Self::tls_context) first to renew under new
    /// parameters. Only available on raw TCP connections carrying TLS;
    /// on failure the connection is closed.
    pub async fn reset_tls(&mut self) -> Result<()> {
        let ctx = self.tls.clone().ok_or_else(|| {
            NetError::TlsHandshakeFailed("client has no TLS context".to_string())
        })?;
        let io = self.io.take().ok_or(NetError::ConnectionClosed)?;

        let handler = match io {
            ClientIo::Tcp(handler) => handler,
            ClientIo::WebSocket(session) => {
                // Not renewable mid-session; put it back untouched.
                self.io = Some(ClientIo::WebSocket(session));
                return Err(NetError::Other(
                    "in-place TLS renewal is only available on raw TCP connections".to_string(),
                ));
            }
        };

        match handler.into_inner() {
            MaybeTlsStream::ClientTls(tls_stream) => {
                let renewed = ctx.reset(*tls_stream).await?;
                self.io = Some(ClientIo::Tcp(
                    TcpFdHandler::new(MaybeTlsStream::ClientTls(Box::new(renewed)))
                        .with_recv_timeout(self.config.recv_timeout),
                ));
                info!(peer = %self.peer_addr, "client tls session renewed");
                Ok(())
            }
            // A plaintext transport has nothing to renew; the
            // connection is gone either way.
            _ => Err(NetError::TlsHandshakeFailed(
                "connection does not carry TLS".to_string(),
            )),
        }
    }

    /// Close the connection
    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut io) = self.io.take() {
            match &mut io {
                ClientIo::Tcp(handler) => handler.close().await?,
                ClientIo::WebSocket(session) => session.close().await?,
            }
            debug!(peer = %self.peer_addr, "client closed");
        }
        Ok(())
    }
}

impl std::fmt::Debug for TcpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpClient")
            .field("peer_addr", &self.peer_addr)
            .field("connected", &self.is_connected())
            .finish()
    }
}
