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

//! Frame types and header parsing for the WebSocket framing layer

use crate::consts;
use crate::result::{CodecError, CodecResult};
use bytes::{BufMut, Bytes, BytesMut};

/// WebSocket frame opcode (RFC 6455 §5.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WsOpcode {
    /// Continuation of a fragmented message
    Continuation = consts::OP_CONTINUATION,
    /// UTF-8 text frame
    Text = consts::OP_TEXT,
    /// Binary frame
    Binary = consts::OP_BINARY,
    /// Connection close
    Close = consts::OP_CLOSE,
    /// Ping (liveness probe)
    Ping = consts::OP_PING,
    /// Pong (liveness answer)
    Pong = consts::OP_PONG,
}

impl WsOpcode {
    /// Convert from the 4-bit wire value
    pub fn from_u8(value: u8) -> CodecResult<Self> {
        match value {
            consts::OP_CONTINUATION => Ok(Self::Continuation),
            consts::OP_TEXT => Ok(Self::Text),
            consts::OP_BINARY => Ok(Self::Binary),
            consts::OP_CLOSE => Ok(Self::Close),
            consts::OP_PING => Ok(Self::Ping),
            consts::OP_PONG => Ok(Self::Pong),
            other => Err(CodecError::InvalidOpcode(other)),
        }
    }

    /// Convert to the 4-bit wire value
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Check whether this is a control opcode (close/ping/pong)
    pub fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }

    /// Check whether this opcode starts or continues application data
    pub fn is_data(self) -> bool {
        matches!(self, Self::Continuation | Self::Text | Self::Binary)
    }
}

impl std::fmt::Display for WsOpcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Continuation => write!(f, "continuation"),
            Self::Text => write!(f, "text"),
            Self::Binary => write!(f, "binary"),
            Self::Close => write!(f, "close"),
            Self::Ping => write!(f, "ping"),
            Self::Pong => write!(f, "pong"),
        }
    }
}

/// A single deframed WebSocket frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsFrame {
    /// Final fragment of the message
    pub fin: bool,
    /// Frame opcode
    pub opcode: WsOpcode,
    /// Unmasked payload bytes
    pub payload: Bytes,
}

impl WsFrame {
    /// Create a final text frame
    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self {
            fin: true,
            opcode: WsOpcode::Text,
            payload: payload.into(),
        }
    }

    /// Create a final binary frame
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self {
            fin: true,
            opcode: WsOpcode::Binary,
            payload: payload.into(),
        }
    }

    /// Create a ping frame
    pub fn ping(payload: impl Into<Bytes>) -> Self {
        Self {
            fin: true,
            opcode: WsOpcode::Ping,
            payload: payload.into(),
        }
    }

    /// Create a pong frame echoing a ping payload
    pub fn pong(payload: impl Into<Bytes>) -> Self {
        Self {
            fin: true,
            opcode: WsOpcode::Pong,
            payload: payload.into(),
        }
    }

    /// Create a close frame with no status code
    pub fn close() -> Self {
        Self {
            fin: true,
            opcode: WsOpcode::Close,
            payload: Bytes::new(),
        }
    }
}

/// Parsed frame header, independent of the payload bytes
///
/// The header is parsed in up to three steps: the two fixed bytes
/// ([`FrameHeader::parse_initial`]), the optional extended length
/// ([`FrameHeader::apply_extended_len`]), and the optional masking key
/// ([`FrameHeader::set_mask`]). Sessions that pull payloads through a
/// length-bounded receive use the same steps as the buffered codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Final fragment of the message
    pub fin: bool,
    /// Frame opcode
    pub opcode: WsOpcode,
    /// Whether the payload is masked
    pub masked: bool,
    /// Masking key (zeroed when `masked` is false)
    pub mask: [u8; consts::MASK_KEY_LEN],
    /// Declared payload length in bytes
    pub payload_len: u64,
    /// Raw 7-bit length field, kept to know how many extended bytes follow
    len7: u8,
}

impl FrameHeader {
    /// Build a header for encoding
    pub fn new(fin: bool, opcode: WsOpcode, payload_len: u64, mask: Option<[u8; 4]>) -> Self {
        let len7 = if payload_len <= 125 {
            payload_len as u8
        } else if payload_len <= u16::MAX as u64 {
            consts::PAYLOAD_LEN_16
        } else {
            consts::PAYLOAD_LEN_64
        };
        Self {
            fin,
            opcode,
            masked: mask.is_some(),
            mask: mask.unwrap_or_default(),
            payload_len,
            len7,
        }
    }

    /// Parse the two fixed header bytes
    ///
    /// Rejects reserved bits, unknown opcodes, and fragmented control
    /// frames. `payload_len` is only final once
    /// [`FrameHeader::apply_extended_len`] has been called for headers
    /// where [`FrameHeader::extended_len_bytes`] is non-zero.
    pub fn parse_initial(b0: u8, b1: u8) -> CodecResult<Self> {
        let rsv = b0 & consts::RSV_MASK;
        if rsv != 0 {
            return Err(CodecError::ReservedBitsSet(rsv));
        }
        let fin = b0 & consts::FIN != 0;
        let opcode = WsOpcode::from_u8(b0 & consts::OPCODE_MASK)?;
        if opcode.is_control() && !fin {
            return Err(CodecError::FragmentedControlFrame);
        }
        let masked = b1 & consts::MASK_BIT != 0;
        let len7 = b1 & consts::PAYLOAD_LEN_MASK;
        Ok(Self {
            fin,
            opcode,
            masked,
            mask: [0; consts::MASK_KEY_LEN],
            payload_len: u64::from(len7),
            len7,
        })
    }

    /// Number of extended length bytes that follow the fixed header
    pub fn extended_len_bytes(&self) -> usize {
        match self.len7 {
            consts::PAYLOAD_LEN_16 => 2,
            consts::PAYLOAD_LEN_64 => 8,
            _ => 0,
        }
    }

    /// Apply the extended length bytes read off the wire
    pub fn apply_extended_len(&mut self, bytes: &[u8]) -> CodecResult<()> {
        self.payload_len = match self.len7 {
            consts::PAYLOAD_LEN_16 => {
                let arr: [u8; 2] = bytes.try_into().map_err(|_| CodecError::IOError {
                    kind: std::io::ErrorKind::InvalidInput,
                    operation: "extended length".to_string(),
                })?;
                u64::from(u16::from_be_bytes(arr))
            }
            consts::PAYLOAD_LEN_64 => {
                let arr: [u8; 8] = bytes.try_into().map_err(|_| CodecError::IOError {
                    kind: std::io::ErrorKind::InvalidInput,
                    operation: "extended length".to_string(),
                })?;
                u64::from_be_bytes(arr)
            }
            _ => self.payload_len,
        };
        Ok(())
    }

    /// Set the masking key read off the wire
    pub fn set_mask(&mut self, key: [u8; consts::MASK_KEY_LEN]) {
        self.masked = true;
        self.mask = key;
    }

    /// Validate the fully parsed header against protocol and size rules
    pub fn validate(&self, max_frame_size: usize) -> CodecResult<()> {
        if self.opcode.is_control() && self.payload_len > consts::MAX_CONTROL_PAYLOAD as u64 {
            return Err(CodecError::ControlFrameTooLong {
                len: self.payload_len,
            });
        }
        if self.payload_len > max_frame_size as u64 {
            return Err(CodecError::FrameTooLarge {
                size: self.payload_len,
                max: max_frame_size as u64,
            });
        }
        Ok(())
    }

    /// Encode the header into `dst`
    pub fn encode(&self, dst: &mut BytesMut) {
        let mut b0 = self.opcode.as_u8();
        if self.fin {
            b0 |= consts::FIN;
        }
        dst.put_u8(b0);

        let mask_bit = if self.masked { consts::MASK_BIT } else { 0 };
        if self.payload_len <= 125 {
            dst.put_u8(mask_bit | self.payload_len as u8);
        } else if self.payload_len <= u16::MAX as u64 {
            dst.put_u8(mask_bit | consts::PAYLOAD_LEN_16);
            dst.put_u16(self.payload_len as u16);
        } else {
            dst.put_u8(mask_bit | consts::PAYLOAD_LEN_64);
            dst.put_u64(self.payload_len);
        }
        if self.masked {
            dst.put_slice(&self.mask);
        }
    }
}

/// XOR a payload in place with a 4-byte masking key
///
/// Masking and unmasking are the same operation.
pub fn mask_bytes(payload: &mut [u8], key: [u8; consts::MASK_KEY_LEN]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % consts::MASK_KEY_LEN];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip() {
        for op in [
            WsOpcode::Continuation,
            WsOpcode::Text,
            WsOpcode::Binary,
            WsOpcode::Close,
            WsOpcode::Ping,
            WsOpcode::Pong,
        ] {
            assert_eq!(WsOpcode::from_u8(op.as_u8()).unwrap(), op);
        }
    }

    #[test]
    fn test_opcode_rejects_reserved() {
        for value in [0x3, 0x7, 0xB, 0xF] {
            assert!(matches!(
                WsOpcode::from_u8(value),
                Err(CodecError::InvalidOpcode(_))
            ));
        }
    }

    #[test]
    fn test_header_small_payload() {
        let header = FrameHeader::parse_initial(0x81, 0x05).unwrap();
        assert!(header.fin);
        assert_eq!(header.opcode, WsOpcode::Text);
        assert!(!header.masked);
        assert_eq!(header.extended_len_bytes(), 0);
        assert_eq!(header.payload_len, 5);
    }

    #[test]
    fn test_header_extended_16() {
        let mut header = FrameHeader::parse_initial(0x82, 126).unwrap();
        assert_eq!(header.extended_len_bytes(), 2);
        header.apply_extended_len(&1000u16.to_be_bytes()).unwrap();
        assert_eq!(header.payload_len, 1000);
    }

    #[test]
    fn test_header_extended_64() {
        let mut header = FrameHeader::parse_initial(0x82, 127).unwrap();
        assert_eq!(header.extended_len_bytes(), 8);
        header.apply_extended_len(&70_000u64.to_be_bytes()).unwrap();
        assert_eq!(header.payload_len, 70_000);
    }

    #[test]
    fn test_header_rejects_reserved_bits() {
        assert!(matches!(
            FrameHeader::parse_initial(0xC1, 0x00),
            Err(CodecError::ReservedBitsSet(_))
        ));
    }

    #[test]
    fn test_header_rejects_fragmented_control() {
        // Ping without FIN
        assert!(matches!(
            FrameHeader::parse_initial(0x09, 0x00),
            Err(CodecError::FragmentedControlFrame)
        ));
    }

    #[test]
    fn test_validate_control_length() {
        let header = FrameHeader::new(true, WsOpcode::Ping, 200, None);
        assert!(matches!(
            header.validate(1 << 20),
            Err(CodecError::ControlFrameTooLong { len: 200 })
        ));
    }

    #[test]
    fn test_validate_frame_too_large() {
        let header = FrameHeader::new(true, WsOpcode::Binary, 2048, None);
        assert!(matches!(
            header.validate(1024),
            Err(CodecError::FrameTooLarge { size: 2048, max: 1024 })
        ));
    }

    #[test]
    fn test_mask_is_involution() {
        let key = [0xA5, 0x5A, 0x12, 0xEF];
        let original = b"the quick brown fox".to_vec();
        let mut masked = original.clone();
        mask_bytes(&mut masked, key);
        assert_ne!(masked, original);
        mask_bytes(&mut masked, key);
        assert_eq!(masked, original);
    }

    #[test]
    fn test_encode_matches_parse() {
        let mut buf = BytesMut::new();
        FrameHeader::new(true, WsOpcode::Text, 300, Some([1, 2, 3, 4])).encode(&mut buf);

        let mut header = FrameHeader::parse_initial(buf[0], buf[1]).unwrap();
        assert_eq!(header.extended_len_bytes(), 2);
        header.apply_extended_len(&buf[2..4]).unwrap();
        header.set_mask([buf[4], buf[5], buf[6], buf[7]]);
        assert_eq!(header.payload_len, 300);
        assert_eq!(header.mask, [1, 2, 3, 4]);
    }
}
