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

//! # Socknet WebSocket Framing Codec
//!
//! This crate provides the WebSocket (RFC 6455) framing layer for the
//! socknet socket framework: a stateful, byte-oriented codec for encoding
//! and decoding frames, plus the HTTP upgrade handshake. It is designed to
//! work with asynchronous networking libraries like Tokio and carries no
//! session state of its own; message reassembly, transparent control-frame
//! handling, and liveness policy live in `socknet-service`.
//!
//! ## Core Components
//!
//! ### [`WebSocketCodec`]
//!
//! The main codec structure, implementing both [`Encoder`] and [`Decoder`]
//! from `tokio_util::codec`. It is role-aware: client-originated frames
//! are masked with a fresh random key per frame, server-originated frames
//! are not, and inbound frames violating the opposite rule are rejected.
//! A configurable cap on declared payload lengths rejects oversized frames
//! before their payload is pulled off the wire.
//!
//! ### [`FrameHeader`]
//!
//! Incremental header parsing, shared between the buffered codec and
//! sessions that read headers with exact-length receives and pull payloads
//! through a timeout-bounded receive.
//!
//! ### [`handshake`]
//!
//! Upgrade request parsing and validation, the accept-token computation,
//! and request/response head builders for both endpoints.
//!
//! ## Usage Example
//!
//! ```rust
//! use socknet_wscodec::{WebSocketCodec, WsFrame, WsRole};
//! use tokio_util::codec::{Decoder, Encoder};
//! use bytes::BytesMut;
//!
//! let mut client = WebSocketCodec::new(WsRole::Client);
//! let mut server = WebSocketCodec::new(WsRole::Server);
//!
//! let mut wire = BytesMut::new();
//! client.encode(WsFrame::text("hello"), &mut wire).unwrap();
//! let frame = server.decode(&mut wire).unwrap().unwrap();
//! assert_eq!(&frame.payload[..], b"hello");
//! ```
//!
//! [`Encoder`]: tokio_util::codec::Encoder
//! [`Decoder`]: tokio_util::codec::Decoder
//! [`FrameHeader`]: crate::frame::FrameHeader
//! [`handshake`]: crate::handshake

pub mod consts;
pub mod handshake;

mod codec;
mod frame;
mod result;

pub use codec::{DEFAULT_MAX_FRAME_SIZE, WebSocketCodec, WsRole};
pub use frame::{FrameHeader, WsFrame, WsOpcode, mask_bytes};
pub use result::{CodecError, CodecResult};
