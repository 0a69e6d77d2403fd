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

//! Error types for the socknet connection lifecycle engine

use crate::types::ConnectionId;
use thiserror::Error;

/// Result type for operations
pub type Result<T> = std::result::Result<T, NetError>;

/// Socknet error types
///
/// Every error is local to one connection's worker: no error on one
/// connection affects another. Rate-limiter denial is not an error at
/// all but a normal control-flow outcome.
#[derive(Debug, Error)]
pub enum NetError {
    /// I/O error from the underlying transport
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A length-bounded receive missed its deadline
    ///
    /// The connection is left open; whether to close is the caller's
    /// decision.
    #[error("Operation timed out")]
    Timeout,

    /// Peer closed the connection, or it was evicted locally
    #[error("Connection closed")]
    ConnectionClosed,

    /// Connection with the given ID was not found
    #[error("Connection {0} not found")]
    ConnectionNotFound(ConnectionId),

    /// The WebSocket upgrade request was malformed or unsupported
    #[error("Handshake rejected: {0}")]
    HandshakeRejected(String),

    /// A frame declared a payload length above the configured maximum
    ///
    /// Terminal for the session: the receiver transitions to `Closing`.
    #[error("Frame of {size} bytes exceeds maximum of {max}")]
    FrameTooLarge {
        /// Declared payload length
        size: u64,
        /// Configured maximum
        max: u64,
    },

    /// TLS handshake failed (certificate or protocol mismatch)
    #[error("TLS handshake failed: {0}")]
    TlsHandshakeFailed(String),

    /// In-place TLS renewal exceeded its hard deadline
    ///
    /// Terminal: the connection is force-closed by the caller.
    #[error("TLS renewal timed out")]
    TlsRenewalTimeout,

    /// A TLS renewal was requested while another was in flight
    #[error("TLS renewal already in progress")]
    TlsRenewalInProgress,

    /// Protocol error from the WebSocket framing layer
    #[error("Protocol error: {0}")]
    Codec(#[from] socknet_wscodec::CodecError),

    /// Maximum number of connections reached
    #[error("Maximum connections ({0}) reached")]
    MaxConnectionsReached(usize),

    /// Server is not running
    #[error("Server not running")]
    ServerNotRunning,

    /// Generic error with a message
    #[error("{0}")]
    Other(String),
}

impl NetError {
    /// Check if the error is recoverable
    ///
    /// Recoverable errors are those where the connection may remain
    /// usable and retrying the operation might succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, NetError::Timeout | NetError::Io(_))
    }

    /// Check if the error is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            NetError::ConnectionNotFound(_) | NetError::ConnectionClosed | NetError::Io(_)
        )
    }

    /// Check if the error is a protocol violation
    ///
    /// Protocol violations are terminal for the connection.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            NetError::HandshakeRejected(_) | NetError::FrameTooLarge { .. } | NetError::Codec(_)
        )
    }

    /// Check if the error is terminal for the TLS layer
    pub fn is_tls_error(&self) -> bool {
        matches!(
            self,
            NetError::TlsHandshakeFailed(_) | NetError::TlsRenewalTimeout
        )
    }
}

/// Map codec errors onto the service-level taxonomy where a dedicated
/// variant exists, so callers can match on what matters.
pub(crate) fn lift_codec_error(err: socknet_wscodec::CodecError) -> NetError {
    use socknet_wscodec::CodecError;
    match err {
        CodecError::FrameTooLarge { size, max } => NetError::FrameTooLarge { size, max },
        CodecError::HandshakeRejected { reason } => NetError::HandshakeRejected(reason),
        CodecError::IncompleteHandshake => {
            NetError::HandshakeRejected("incomplete handshake head".to_string())
        }
        other => NetError::Codec(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_recoverable() {
        assert!(NetError::Timeout.is_recoverable());
        assert!(!NetError::ConnectionClosed.is_recoverable());
        assert!(!NetError::TlsRenewalTimeout.is_recoverable());
    }

    #[test]
    fn test_error_is_connection_error() {
        assert!(NetError::ConnectionNotFound(ConnectionId::new(1)).is_connection_error());
        assert!(NetError::ConnectionClosed.is_connection_error());
        assert!(!NetError::Timeout.is_connection_error());
    }

    #[test]
    fn test_error_is_protocol_error() {
        assert!(NetError::HandshakeRejected("bad version".to_string()).is_protocol_error());
        assert!(NetError::FrameTooLarge { size: 10, max: 5 }.is_protocol_error());
        assert!(!NetError::Timeout.is_protocol_error());
    }

    #[test]
    fn test_lift_codec_error() {
        let lifted = lift_codec_error(socknet_wscodec::CodecError::FrameTooLarge {
            size: 2048,
            max: 1024,
        });
        assert!(matches!(
            lifted,
            NetError::FrameTooLarge { size: 2048, max: 1024 }
        ));

        let lifted = lift_codec_error(socknet_wscodec::CodecError::HandshakeRejected {
            reason: "missing key".to_string(),
        });
        assert!(matches!(lifted, NetError::HandshakeRejected(_)));
    }

    #[test]
    fn test_error_display() {
        let err = NetError::FrameTooLarge { size: 2048, max: 1024 };
        assert_eq!(err.to_string(), "Frame of 2048 bytes exceeds maximum of 1024");

        let err = NetError::ConnectionNotFound(ConnectionId::new(42));
        assert_eq!(err.to_string(), "Connection conn-42 not found");
    }
}
