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

//! Receive and send primitives over raw descriptors
//!
//! `TcpFdHandler` wraps a byte stream and provides three receive shapes:
//! a single read ([`recv_some`](TcpFdHandler::recv_some)), an exact-length
//! read without a deadline ([`recv_data`](TcpFdHandler::recv_data)), and an
//! exact-length read bounded by a deadline
//! ([`recv_data_by_length`](TcpFdHandler::recv_data_by_length)). A missed
//! deadline discards whatever partial data arrived and leaves the stream
//! open; whether to close is the caller's decision.

use crate::error::{NetError, Result};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UdpSocket;
use tracing::trace;

/// Default deadline for length-bounded receives
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Common send/receive surface over a connected descriptor
#[async_trait]
pub trait FdHandler: Send {
    /// Receive whatever is available, up to `max` bytes
    ///
    /// Returns `None` once the peer has closed the connection.
    async fn recv(&mut self, max: usize) -> Result<Option<Bytes>>;

    /// Send all of `data`, returning the number of bytes written
    async fn send(&mut self, data: &[u8]) -> Result<usize>;

    /// Close the descriptor for writing
    async fn close(&mut self) -> Result<()>;
}

/// Receive/send primitives over a connected byte stream
///
/// Generic over the stream so the same handler runs on plaintext TCP,
/// TLS-wrapped streams, and in-memory test pipes.
#[derive(Debug)]
pub struct TcpFdHandler<S> {
    stream: S,
    recv_timeout: Duration,
}

impl<S> TcpFdHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap a connected stream with the default receive deadline
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            recv_timeout: DEFAULT_RECV_TIMEOUT,
        }
    }

    /// Set the default deadline used by length-bounded receives
    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }

    /// The default deadline used by length-bounded receives
    pub fn recv_timeout(&self) -> Duration {
        self.recv_timeout
    }

    /// Get a reference to the underlying stream
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Get a mutable reference to the underlying stream
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Consume the handler, returning the underlying stream
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Receive whatever is available, up to `max` bytes, in one read
    ///
    /// Returns `None` on a clean peer close.
    pub async fn recv_some(&mut self, max: usize) -> Result<Option<Bytes>> {
        let mut buf = BytesMut::with_capacity(max);
        let n = self.stream.read_buf(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        trace!(bytes = n, "recv_some");
        Ok(Some(buf.freeze()))
    }

    /// Receive exactly `len` bytes, waiting as long as it takes
    ///
    /// Returns [`NetError::ConnectionClosed`] if the peer closes before
    /// `len` bytes have arrived.
    pub async fn recv_data(&mut self, len: usize) -> Result<Bytes> {
        let mut buf = BytesMut::zeroed(len);
        match self.stream.read_exact(&mut buf).await {
            Ok(_) => {
                trace!(bytes = len, "recv_data");
                Ok(buf.freeze())
            }
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(NetError::ConnectionClosed)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Receive exactly `len` bytes within a deadline
    ///
    /// `timeout` of `None` uses the handler's configured default (2s
    /// unless overridden). On a missed deadline any partial bytes read
    /// so far are discarded and [`NetError::Timeout`] is returned; the
    /// stream stays open.
    pub async fn recv_data_by_length(
        &mut self,
        len: usize,
        timeout: Option<Duration>,
    ) -> Result<Bytes> {
        let deadline = timeout.unwrap_or(self.recv_timeout);
        match tokio::time::timeout(deadline, self.recv_data(len)).await {
            Ok(result) => result,
            Err(_) => {
                trace!(bytes = len, ?deadline, "recv_data_by_length deadline missed");
                Err(NetError::Timeout)
            }
        }
    }

    /// Send all of `data`
    pub async fn send_data(&mut self, data: &[u8]) -> Result<usize> {
        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        trace!(bytes = data.len(), "send_data");
        Ok(data.len())
    }

    /// Shut down the write half of the stream
    pub async fn close(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

#[async_trait]
impl<S> FdHandler for TcpFdHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn recv(&mut self, max: usize) -> Result<Option<Bytes>> {
        self.recv_some(max).await
    }

    async fn send(&mut self, data: &[u8]) -> Result<usize> {
        self.send_data(data).await
    }

    async fn close(&mut self) -> Result<()> {
        TcpFdHandler::close(self).await
    }
}

/// Receive/send primitives over a UDP socket
///
/// Receives operate on whole datagrams: one receive consumes one
/// datagram, and a datagram longer than the provided capacity is
/// truncated by the OS.
#[derive(Debug)]
pub struct UdpFdHandler {
    socket: UdpSocket,
    recv_timeout: Duration,
    max_datagram: usize,
}

impl UdpFdHandler {
    /// Wrap a bound UDP socket
    pub fn new(socket: UdpSocket) -> Self {
        Self {
            socket,
            recv_timeout: DEFAULT_RECV_TIMEOUT,
            max_datagram: 64 * 1024,
        }
    }

    /// Set the default deadline used by length-bounded receives
    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }

    /// Set the receive capacity for unbounded datagram receives
    ///
    /// Datagrams longer than this are truncated by the OS.
    pub fn with_max_datagram(mut self, max: usize) -> Self {
        self.max_datagram = max;
        self
    }

    /// Get a reference to the underlying socket
    pub fn get_ref(&self) -> &UdpSocket {
        &self.socket
    }

    /// Receive one datagram, waiting as long as it takes
    pub async fn recv_from(&self) -> Result<(Bytes, SocketAddr)> {
        let mut buf = BytesMut::zeroed(self.max_datagram);
        let (n, addr) = self.socket.recv_from(&mut buf).await?;
        buf.truncate(n);
        trace!(bytes = n, peer = %addr, "recv_from");
        Ok((buf.freeze(), addr))
    }

    /// Receive one datagram of up to `len` bytes within a deadline
    ///
    /// Datagram boundaries win over the requested length: the returned
    /// buffer holds exactly one datagram, which may be shorter than
    /// `len`. `timeout` of `None` uses the configured default.
    pub async fn recv_from_by_length(
        &self,
        len: usize,
        timeout: Option<Duration>,
    ) -> Result<(Bytes, SocketAddr)> {
        let deadline = timeout.unwrap_or(self.recv_timeout);
        let mut buf = BytesMut::zeroed(len);
        match tokio::time::timeout(deadline, self.socket.recv_from(&mut buf)).await {
            Ok(Ok((n, addr))) => {
                buf.truncate(n);
                trace!(bytes = n, peer = %addr, "recv_from_by_length");
                Ok((buf.freeze(), addr))
            }
            Ok(Err(err)) => Err(err.into()),
            Err(_) => Err(NetError::Timeout),
        }
    }

    /// Send one datagram to the given address
    pub async fn send_to(&self, data: &[u8], addr: SocketAddr) -> Result<usize> {
        let n = self.socket.send_to(data, addr).await?;
        trace!(bytes = n, peer = %addr, "send_to");
        Ok(n)
    }
}
