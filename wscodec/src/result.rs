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

/// Result Type for Codec Operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Represents possible errors that can occur while framing or deframing
/// WebSocket traffic, or while performing the upgrade handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// An I/O error occurred while reading from or writing to the underlying stream.
    IOError {
        /// The kind of I/O error that occurred
        kind: std::io::ErrorKind,
        /// Description of the operation that failed
        operation: String,
    },

    /// A frame declared a payload length above the configured maximum.
    ///
    /// The session receiving this error is expected to transition to
    /// `Closing`; the frame is never read off the wire.
    FrameTooLarge {
        /// Declared payload length
        size: u64,
        /// Configured maximum
        max: u64,
    },

    /// An unknown or reserved opcode was encountered in a frame header.
    InvalidOpcode(u8),

    /// One or more reserved bits (RSV1-RSV3) were set without a negotiated
    /// extension to give them meaning.
    ReservedBitsSet(u8),

    /// A control frame (close/ping/pong) was fragmented, which the
    /// protocol forbids.
    FragmentedControlFrame,

    /// A control frame carried more than 125 bytes of payload.
    ControlFrameTooLong {
        /// Declared payload length of the offending frame
        len: u64,
    },

    /// A frame violated the masking rules for its direction: frames from
    /// a client must be masked, frames from a server must not be.
    MaskViolation {
        /// Whether the frame was required to be masked
        expected_masked: bool,
    },

    /// The HTTP upgrade request or response was malformed or unsupported
    /// (wrong method, missing key, wrong protocol version).
    HandshakeRejected {
        /// Description of what was wrong with the handshake
        reason: String,
    },

    /// The handshake bytes ended before a complete HTTP head was seen.
    IncompleteHandshake,

    /// A continuation frame arrived with no message in progress, or a new
    /// data frame arrived while a fragmented message was still open.
    FragmentSequence {
        /// Description of the sequencing violation
        reason: String,
    },
}

impl std::error::Error for CodecError {}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::IOError { kind, operation } => {
                write!(f, "I/O error during {}: {:?}", operation, kind)
            }
            CodecError::FrameTooLarge { size, max } => {
                write!(f, "frame payload of {} bytes exceeds maximum of {}", size, max)
            }
            CodecError::InvalidOpcode(op) => {
                write!(f, "invalid opcode: 0x{:X}", op)
            }
            CodecError::ReservedBitsSet(bits) => {
                write!(f, "reserved header bits set: 0x{:02X}", bits)
            }
            CodecError::FragmentedControlFrame => {
                write!(f, "control frame must not be fragmented")
            }
            CodecError::ControlFrameTooLong { len } => {
                write!(f, "control frame payload of {} bytes exceeds 125", len)
            }
            CodecError::MaskViolation { expected_masked } => {
                if *expected_masked {
                    write!(f, "client frame received without masking")
                } else {
                    write!(f, "server frame received with masking")
                }
            }
            CodecError::HandshakeRejected { reason } => {
                write!(f, "handshake rejected: {}", reason)
            }
            CodecError::IncompleteHandshake => {
                write!(f, "incomplete handshake head")
            }
            CodecError::FragmentSequence { reason } => {
                write!(f, "fragment sequence error: {}", reason)
            }
        }
    }
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        CodecError::IOError {
            kind: err.kind(),
            operation: err.to_string(),
        }
    }
}
