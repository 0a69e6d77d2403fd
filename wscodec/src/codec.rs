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

use crate::consts;
use crate::frame::{FrameHeader, WsFrame, mask_bytes};
use crate::result::CodecError;
use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

/// Which end of the connection this codec speaks for
///
/// The role decides the masking rules: frames originated by a client are
/// masked with a fresh random key per frame, frames originated by a
/// server are never masked, and each side rejects inbound frames that
/// violate the opposite rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsRole {
    /// Client endpoint: masks outbound frames, expects unmasked inbound
    Client,
    /// Server endpoint: never masks outbound, expects masked inbound
    Server,
}

/// Default cap on a single frame's declared payload length
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1 << 20;

/// A codec for framing and deframing WebSocket traffic
///
/// `WebSocketCodec` implements [`Decoder`] and [`Encoder`] from
/// `tokio_util::codec` over raw bytes. It is stateless between frames:
/// message reassembly from fragments belongs to the session layer, which
/// also owns the transparent handling of control frames.
#[derive(Debug, Clone)]
pub struct WebSocketCodec {
    role: WsRole,
    max_frame_size: usize,
}

impl WebSocketCodec {
    /// Create a codec for the given role with the default frame size cap
    pub fn new(role: WsRole) -> Self {
        Self {
            role,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Set the maximum accepted declared payload length
    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }

    /// The role this codec was created with
    pub fn role(&self) -> WsRole {
        self.role
    }

    /// The configured frame size cap
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Check an inbound header against this role's masking rule
    fn check_mask_rule(&self, header: &FrameHeader) -> Result<(), CodecError> {
        let expected_masked = self.role == WsRole::Server;
        if header.masked != expected_masked {
            warn!(
                masked = header.masked,
                role = ?self.role,
                "frame violates masking rule"
            );
            return Err(CodecError::MaskViolation { expected_masked });
        }
        Ok(())
    }
}

impl Decoder for WebSocketCodec {
    type Item = WsFrame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<WsFrame>, Self::Error> {
        if src.len() < 2 {
            return Ok(None);
        }

        // Parse the header without consuming, so an incomplete frame
        // leaves the buffer untouched.
        let mut header = FrameHeader::parse_initial(src[0], src[1])?;
        let ext = header.extended_len_bytes();
        let mask_len = if header.masked { consts::MASK_KEY_LEN } else { 0 };
        let header_len = 2 + ext + mask_len;
        if src.len() < header_len {
            return Ok(None);
        }
        if ext > 0 {
            header.apply_extended_len(&src[2..2 + ext])?;
        }
        if header.masked {
            let mut key = [0u8; consts::MASK_KEY_LEN];
            key.copy_from_slice(&src[2 + ext..header_len]);
            header.set_mask(key);
        }

        // Size and control-frame rules apply before the payload is pulled.
        header.validate(self.max_frame_size)?;
        self.check_mask_rule(&header)?;

        let payload_len = header.payload_len as usize;
        if src.len() < header_len + payload_len {
            src.reserve(header_len + payload_len - src.len());
            return Ok(None);
        }

        src.advance(header_len);
        let mut payload = src.split_to(payload_len);
        if header.masked {
            mask_bytes(&mut payload[..], header.mask);
        }

        Ok(Some(WsFrame {
            fin: header.fin,
            opcode: header.opcode,
            payload: payload.freeze(),
        }))
    }
}

impl Encoder<WsFrame> for WebSocketCodec {
    type Error = CodecError;

    fn encode(&mut self, item: WsFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mask = match self.role {
            WsRole::Client => Some(rand::random::<[u8; 4]>()),
            WsRole::Server => None,
        };
        let header = FrameHeader::new(item.fin, item.opcode, item.payload.len() as u64, mask);
        header.validate(self.max_frame_size)?;

        dst.reserve(2 + 8 + consts::MASK_KEY_LEN + item.payload.len());
        header.encode(dst);
        match mask {
            Some(key) => {
                let mut payload = item.payload.to_vec();
                mask_bytes(&mut payload, key);
                dst.extend_from_slice(&payload);
            }
            None => dst.extend_from_slice(&item.payload),
        }
        Ok(())
    }
}
