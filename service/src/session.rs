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

//! WebSocket session over a byte stream
//!
//! A [`WebSocketSession`] owns the stream after a successful upgrade
//! handshake and exposes whole messages: control frames are handled
//! transparently ([`next_message`](WebSocketSession::next_message)
//! answers pings, records pongs, and completes the close handshake),
//! and fragmented messages are reassembled before delivery. Inbound
//! bytes accumulate in a session-owned buffer that the codec decodes
//! from, so a read future dropped mid-frame resumes exactly where it
//! stopped. The declared payload length of the frame in flight is
//! observable through [`SessionInfo::recv_length`] and drops back to
//! zero once the frame has been consumed.

use crate::error::{NetError, Result, lift_codec_error};
use crate::fd::TcpFdHandler;
use bytes::{Bytes, BytesMut};
use socknet_wscodec::{
    CodecError, FrameHeader, WebSocketCodec, WsFrame, WsOpcode, WsRole, handshake,
};
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace};

const MAX_HEAD_BYTES: usize = 16 * 1024;

/// Lifecycle state of a WebSocket session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Session is open and exchanging messages
    Open,
    /// A close frame has been sent or a protocol fault occurred
    Closing,
    /// Close handshake complete, no further traffic
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Per-session bookkeeping
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Declared payload length of the frame currently being received
    /// (zero between messages)
    pub recv_length: u64,
    /// Raw handshake request head (received on servers, sent on clients)
    pub header: Option<String>,
    /// Raw handshake response head (sent on servers, received on clients)
    pub response: Option<String>,
    /// Request path from the upgrade
    pub path: Option<String>,
    /// Whether this side has sent its close frame
    pub close_sent: bool,
    /// Time of the last frame in either direction
    pub last_traffic: Instant,
}

impl SessionInfo {
    fn new() -> Self {
        Self {
            recv_length: 0,
            header: None,
            response: None,
            path: None,
            close_sent: false,
            last_traffic: Instant::now(),
        }
    }
}

/// A WebSocket session bound to an upgraded stream
#[derive(Debug)]
pub struct WebSocketSession<S> {
    handler: TcpFdHandler<S>,
    codec: WebSocketCodec,
    role: WsRole,
    state: SessionState,
    info: SessionInfo,
    // Undecoded inbound bytes. Partial frames live here between reads,
    // so dropping a pending read loses nothing.
    readbuf: BytesMut,
    fragments: Option<BytesMut>,
}

impl<S> WebSocketSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Accept an upgrade request on a server-side stream
    ///
    /// Reads the HTTP head, validates it, and answers with
    /// `101 Switching Protocols`. Bytes pipelined after the head are
    /// kept and served to the first frame read.
    pub async fn accept(stream: S, max_frame_size: usize) -> Result<Self> {
        let mut handler = TcpFdHandler::new(stream);
        let mut readbuf = BytesMut::new();

        let head = read_head(&mut handler, &mut readbuf).await?;
        let request = handshake::UpgradeRequest::parse(&head).map_err(lift_codec_error)?;
        let response = handshake::build_response(&handshake::accept_key(&request.key));
        handler.send_data(response.as_bytes()).await?;
        debug!(path = %request.path, "websocket upgrade accepted");

        let mut info = SessionInfo::new();
        info.path = Some(request.path);
        info.header = Some(request.raw);
        info.response = Some(response);

        Ok(Self {
            handler,
            codec: WebSocketCodec::new(WsRole::Server).with_max_frame_size(max_frame_size),
            role: WsRole::Server,
            state: SessionState::Open,
            info,
            readbuf,
            fragments: None,
        })
    }

    /// Open a session on a client-side stream
    ///
    /// Sends the upgrade request and validates the server's accept
    /// token against the key that was sent.
    pub async fn connect(stream: S, host: &str, path: &str, max_frame_size: usize) -> Result<Self> {
        let mut handler = TcpFdHandler::new(stream);
        let mut readbuf = BytesMut::new();

        let key = handshake::generate_key();
        let request = handshake::build_request(host, path, &key);
        handler.send_data(request.as_bytes()).await?;

        let head = read_head(&mut handler, &mut readbuf).await?;
        let accept = handshake::parse_response(&head).map_err(lift_codec_error)?;
        if accept != handshake::accept_key(&key) {
            return Err(NetError::HandshakeRejected(
                "accept token mismatch".to_string(),
            ));
        }
        debug!(host, path, "websocket upgrade complete");

        let mut info = SessionInfo::new();
        info.path = Some(path.to_string());
        info.header = Some(request);
        info.response = Some(head);

        Ok(Self {
            handler,
            codec: WebSocketCodec::new(WsRole::Client).with_max_frame_size(max_frame_size),
            role: WsRole::Client,
            state: SessionState::Open,
            info,
            readbuf,
            fragments: None,
        })
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Session bookkeeping snapshot
    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    /// Role this side plays in the session
    pub fn role(&self) -> WsRole {
        self.role
    }

    /// Consume the session, returning the underlying stream
    pub fn into_inner(self) -> S {
        self.handler.into_inner()
    }

    /// Receive the next complete application message
    ///
    /// Pings are answered, pongs recorded, and fragments reassembled
    /// without surfacing to the caller. Returns `None` once the close
    /// handshake has completed. A frame above the size limit fails with
    /// [`NetError::FrameTooLarge`] and moves the session to `Closing`.
    pub async fn next_message(&mut self) -> Result<Option<Bytes>> {
        if self.state == SessionState::Closed {
            return Ok(None);
        }
        loop {
            let frame = match self.read_frame().await {
                Ok(frame) => frame,
                Err(err) => {
                    if err.is_protocol_error() {
                        self.state = SessionState::Closing;
                    }
                    return Err(err);
                }
            };
            self.info.last_traffic = Instant::now();

            match frame.opcode {
                WsOpcode::Ping => {
                    trace!(len = frame.payload.len(), "ping answered");
                    self.write_frame(WsFrame::pong(frame.payload)).await?;
                }
                WsOpcode::Pong => {
                    trace!("pong received");
                }
                WsOpcode::Close => {
                    if !self.info.close_sent {
                        self.write_frame(WsFrame::close()).await?;
                        self.info.close_sent = true;
                    }
                    self.state = SessionState::Closed;
                    debug!("close handshake complete");
                    return Ok(None);
                }
                WsOpcode::Text | WsOpcode::Binary => {
                    if self.fragments.is_some() {
                        self.state = SessionState::Closing;
                        return Err(lift_codec_error(CodecError::FragmentSequence {
                            reason: "data frame inside a fragmented message".to_string(),
                        }));
                    }
                    if frame.fin {
                        return Ok(Some(frame.payload));
                    }
                    self.fragments = Some(BytesMut::from(&frame.payload[..]));
                }
                WsOpcode::Continuation => {
                    let Some(mut acc) = self.fragments.take() else {
                        self.state = SessionState::Closing;
                        return Err(lift_codec_error(CodecError::FragmentSequence {
                            reason: "continuation without an open message".to_string(),
                        }));
                    };
                    acc.extend_from_slice(&frame.payload);
                    if frame.fin {
                        return Ok(Some(acc.freeze()));
                    }
                    self.fragments = Some(acc);
                }
            }
        }
    }

    /// Send a final text message
    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<()> {
        self.write_frame(WsFrame::text(text.into())).await
    }

    /// Send a final binary message
    pub async fn send_binary(&mut self, payload: impl Into<Bytes>) -> Result<()> {
        self.write_frame(WsFrame::binary(payload)).await
    }

    /// Send a ping probe
    pub async fn send_ping(&mut self, payload: impl Into<Bytes>) -> Result<()> {
        self.write_frame(WsFrame::ping(payload)).await
    }

    /// Send an arbitrary frame
    pub async fn send_frame(&mut self, frame: WsFrame) -> Result<()> {
        self.write_frame(frame).await
    }

    /// Start (or complete this side of) the close handshake
    ///
    /// Sends a close frame if one has not gone out yet and moves the
    /// session to `Closing`; the peer's close frame, observed by
    /// [`next_message`](Self::next_message), completes the handshake.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        if !self.info.close_sent {
            self.write_frame(WsFrame::close()).await?;
            self.info.close_sent = true;
        }
        self.state = SessionState::Closing;
        Ok(())
    }

    async fn write_frame(&mut self, frame: WsFrame) -> Result<()> {
        if self.state == SessionState::Closed {
            return Err(NetError::ConnectionClosed);
        }
        let mut wire = BytesMut::with_capacity(frame.payload.len() + 16);
        self.codec
            .encode(frame, &mut wire)
            .map_err(lift_codec_error)?;
        self.handler.send_data(&wire).await?;
        self.info.last_traffic = Instant::now();
        Ok(())
    }

    /// Read one frame, decoding out of the session buffer
    ///
    /// Every inbound byte lands in `readbuf` before the codec consumes
    /// a complete frame from it, so a future dropped between reads
    /// resumes mid-frame without losing stream position.
    async fn read_frame(&mut self) -> Result<WsFrame> {
        loop {
            if let Some(frame) = self
                .codec
                .decode(&mut self.readbuf)
                .map_err(lift_codec_error)?
            {
                self.info.recv_length = 0;
                return Ok(frame);
            }
            self.info.recv_length = declared_payload_len(&self.readbuf).unwrap_or(0);

            // The start of a frame waits indefinitely (an idle session
            // is legal); once a frame has begun, the remainder is
            // deadline-bounded.
            let n = if self.readbuf.is_empty() {
                self.handler.get_mut().read_buf(&mut self.readbuf).await?
            } else {
                let deadline = self.handler.recv_timeout();
                match tokio::time::timeout(
                    deadline,
                    self.handler.get_mut().read_buf(&mut self.readbuf),
                )
                .await
                {
                    Ok(read) => read?,
                    Err(_) => return Err(NetError::Timeout),
                }
            };
            if n == 0 {
                return Err(NetError::ConnectionClosed);
            }
        }
    }
}

/// Declared payload length of the frame at the front of `src`, if its
/// header bytes have arrived
fn declared_payload_len(src: &[u8]) -> Option<u64> {
    if src.len() < 2 {
        return None;
    }
    let mut header = FrameHeader::parse_initial(src[0], src[1]).ok()?;
    let ext = header.extended_len_bytes();
    if ext == 0 {
        return Some(header.payload_len);
    }
    if src.len() < 2 + ext {
        return None;
    }
    header.apply_extended_len(&src[2..2 + ext]).ok()?;
    Some(header.payload_len)
}

/// Read an HTTP head up to and including the blank line
///
/// Bytes past the terminator stay in `readbuf`.
async fn read_head<S>(handler: &mut TcpFdHandler<S>, readbuf: &mut BytesMut) -> Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    loop {
        if let Some(pos) = readbuf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = readbuf.split_to(pos + 4);
            return String::from_utf8(head.to_vec())
                .map_err(|_| NetError::HandshakeRejected("head is not valid UTF-8".to_string()));
        }
        if readbuf.len() > MAX_HEAD_BYTES {
            return Err(NetError::HandshakeRejected(
                "handshake head too large".to_string(),
            ));
        }
        match handler.recv_some(4096).await? {
            Some(chunk) => readbuf.extend_from_slice(&chunk),
            None => return Err(NetError::ConnectionClosed),
        }
    }
}
