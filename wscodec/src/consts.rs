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

//! Wire-level constants for the WebSocket framing layer (RFC 6455)

/// FIN bit in the first header byte
pub const FIN: u8 = 0x80;

/// Reserved bits RSV1-RSV3 in the first header byte
pub const RSV_MASK: u8 = 0x70;

/// Opcode bits in the first header byte
pub const OPCODE_MASK: u8 = 0x0F;

/// MASK bit in the second header byte
pub const MASK_BIT: u8 = 0x80;

/// 7-bit payload length field in the second header byte
pub const PAYLOAD_LEN_MASK: u8 = 0x7F;

/// Marker value: payload length follows as 16-bit big-endian
pub const PAYLOAD_LEN_16: u8 = 126;

/// Marker value: payload length follows as 64-bit big-endian
pub const PAYLOAD_LEN_64: u8 = 127;

/// Largest payload a control frame (close/ping/pong) may carry
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// Length of a client masking key
pub const MASK_KEY_LEN: usize = 4;

/// GUID appended to the client key when computing the accept token
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The only protocol version this codec speaks
pub const WEBSOCKET_VERSION: &str = "13";

/// Opcode values
pub const OP_CONTINUATION: u8 = 0x0;
/// Text frame opcode
pub const OP_TEXT: u8 = 0x1;
/// Binary frame opcode
pub const OP_BINARY: u8 = 0x2;
/// Close frame opcode
pub const OP_CLOSE: u8 = 0x8;
/// Ping frame opcode
pub const OP_PING: u8 = 0x9;
/// Pong frame opcode
pub const OP_PONG: u8 = 0xA;
