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

//! Handler trait for the socknet server

use crate::connection::Connection;
use crate::error::NetError;
use crate::types::ConnectionId;
use async_trait::async_trait;
use bytes::Bytes;

/// Server event handler trait
///
/// Implement this trait to handle events from the server. All methods
/// are async and have default implementations that do nothing.
///
/// # Example
///
/// ```no_run
/// use socknet_service::{Connection, ConnectionId, ServerHandler};
/// use async_trait::async_trait;
/// use bytes::Bytes;
///
/// struct EchoHandler;
///
/// #[async_trait]
/// impl ServerHandler for EchoHandler {
///     async fn on_message(&self, _id: ConnectionId, conn: &Connection, message: Bytes) {
///         let _ = conn.send(&message).await;
///     }
/// }
/// ```
#[async_trait]
pub trait ServerHandler: Send + Sync + 'static {
    /// Called when a new connection is established
    ///
    /// This is called after admission control, the optional TLS
    /// handshake, and the optional WebSocket upgrade have all
    /// completed, and before any messages are processed.
    async fn on_connect(&self, _id: ConnectionId, _conn: &Connection) {}

    /// Called for every message received from the client
    ///
    /// On raw TCP connections a message is whatever one receive
    /// returned; on WebSocket connections it is one complete,
    /// reassembled application message.
    async fn on_message(&self, _id: ConnectionId, _conn: &Connection, _message: Bytes) {}

    /// Called when an error occurs on a connection
    ///
    /// The connection will be closed after this method returns.
    async fn on_error(&self, _id: ConnectionId, _conn: &Connection, _error: NetError) {}

    /// Called when a read operation times out
    ///
    /// The connection will be closed after this method returns.
    async fn on_timeout(&self, _id: ConnectionId, _conn: &Connection) {}

    /// Called when a connection is idle for too long
    ///
    /// The connection will be closed after this method returns.
    async fn on_idle_timeout(&self, _id: ConnectionId, _conn: &Connection) {}

    /// Called when a connection is disconnected
    ///
    /// This is called when the connection is closed, whether by the
    /// client, the server, the liveness sweep, or an error.
    async fn on_disconnect(&self, _id: ConnectionId, _conn: &Connection) {}
}
