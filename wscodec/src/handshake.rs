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

//! HTTP upgrade handshake for the WebSocket framing layer
//!
//! The handshake is plain HTTP/1.1: the client sends a GET with
//! `Upgrade: websocket`, a random base64 key, and version 13; the server
//! answers `101 Switching Protocols` with an accept token derived from
//! the key. Everything after the blank line is WebSocket frames.

use crate::consts;
use crate::result::{CodecError, CodecResult};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha1::{Digest, Sha1};

/// Terminator of an HTTP head
pub const HEAD_TERMINATOR: &str = "\r\n\r\n";

/// A parsed and validated client upgrade request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeRequest {
    /// Request path and query string as sent by the client
    pub path: String,
    /// The client's `Sec-WebSocket-Key` value
    pub key: String,
    /// The raw request head, kept for the session's handshake record
    pub raw: String,
}

impl UpgradeRequest {
    /// Parse and validate a raw HTTP request head
    ///
    /// Fails with [`CodecError::HandshakeRejected`] when the request is
    /// not a well-formed GET upgrade to WebSocket version 13 with a key,
    /// and with [`CodecError::IncompleteHandshake`] when the head is not
    /// terminated yet.
    pub fn parse(raw: &str) -> CodecResult<Self> {
        if !raw.contains(HEAD_TERMINATOR) {
            return Err(CodecError::IncompleteHandshake);
        }

        let mut lines = raw.split("\r\n");
        let request_line = lines.next().unwrap_or_default();
        let mut parts = request_line.split_whitespace();
        let method = parts.next().unwrap_or_default();
        let path = parts.next().unwrap_or_default();
        if method != "GET" {
            return Err(CodecError::HandshakeRejected {
                reason: format!("method {} is not GET", method),
            });
        }
        if path.is_empty() {
            return Err(CodecError::HandshakeRejected {
                reason: "missing request path".to_string(),
            });
        }

        let mut upgrade = None;
        let mut key = None;
        let mut version = None;
        for line in lines {
            if line.is_empty() {
                break;
            }
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match name.trim().to_ascii_lowercase().as_str() {
                "upgrade" => upgrade = Some(value.to_ascii_lowercase()),
                "sec-websocket-key" => key = Some(value.to_string()),
                "sec-websocket-version" => version = Some(value.to_string()),
                _ => {}
            }
        }

        if upgrade.as_deref() != Some("websocket") {
            return Err(CodecError::HandshakeRejected {
                reason: "missing Upgrade: websocket header".to_string(),
            });
        }
        if version.as_deref() != Some(consts::WEBSOCKET_VERSION) {
            return Err(CodecError::HandshakeRejected {
                reason: format!(
                    "unsupported protocol version {:?}",
                    version.unwrap_or_default()
                ),
            });
        }
        let key = key.ok_or_else(|| CodecError::HandshakeRejected {
            reason: "missing Sec-WebSocket-Key header".to_string(),
        })?;
        if key.is_empty() {
            return Err(CodecError::HandshakeRejected {
                reason: "empty Sec-WebSocket-Key header".to_string(),
            });
        }

        Ok(Self {
            path: path.to_string(),
            key,
            raw: raw.to_string(),
        })
    }
}

/// Compute the accept token for a client key (RFC 6455 §4.2.2)
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(consts::WEBSOCKET_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Generate a fresh random client key
pub fn generate_key() -> String {
    BASE64.encode(rand::random::<[u8; 16]>())
}

/// Build the server's `101 Switching Protocols` response head
pub fn build_response(accept: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        accept
    )
}

/// Build a client upgrade request head
pub fn build_request(host: &str, path: &str, key: &str) -> String {
    format!(
        "GET {} HTTP/1.1\r\n\
         Host: {}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {}\r\n\
         Sec-WebSocket-Version: {}\r\n\r\n",
        path,
        host,
        key,
        consts::WEBSOCKET_VERSION
    )
}

/// Extract the accept token from a server handshake response head
///
/// Fails when the response is not a `101` or carries no accept header.
pub fn parse_response(raw: &str) -> CodecResult<String> {
    if !raw.contains(HEAD_TERMINATOR) {
        return Err(CodecError::IncompleteHandshake);
    }
    let mut lines = raw.split("\r\n");
    let status_line = lines.next().unwrap_or_default();
    if !status_line.contains("101") {
        return Err(CodecError::HandshakeRejected {
            reason: format!("unexpected status line {:?}", status_line),
        });
    }
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':')
            && name.trim().eq_ignore_ascii_case("sec-websocket-accept")
        {
            return Ok(value.trim().to_string());
        }
    }
    Err(CodecError::HandshakeRejected {
        reason: "missing Sec-WebSocket-Accept header".to_string(),
    })
}
