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

//! Connection manager implementation
//!
//! The ConnectionManager is responsible for:
//! - Managing all active connections
//! - Spawning and tracking connection workers
//! - Registering connections in the liveness table
//! - Running the liveness sweep that evicts expired connections
//! - Broadcasting messages to all connections
//! - Graceful shutdown coordination

use crate::connection::Connection;
use crate::error::{NetError, Result};
use crate::handler::ServerHandler;
use crate::heartbeat::Heartbeat;
use crate::limiter::RateLimiter;
use crate::metrics::ServerMetrics;
use crate::types::{ConnectionId, ConnectionInfo, ConnectionState};
use crate::worker::{ConnectionWorker, ControlMessage, WorkerConfig};
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Result of a broadcast operation
#[derive(Debug, Clone)]
pub struct BroadcastResult {
    /// Total number of connections attempted
    pub total: usize,
    /// Number of successful sends
    pub succeeded: usize,
    /// Number of failed sends
    pub failed: usize,
    /// Errors that occurred (ConnectionId and error message)
    pub errors: Vec<(ConnectionId, String)>,
}

impl BroadcastResult {
    fn new() -> Self {
        Self {
            total: 0,
            succeeded: 0,
            failed: 0,
            errors: Vec::new(),
        }
    }

    /// Check if all broadcasts succeeded
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Managed connection entry
struct ManagedConnection {
    /// Connection ID
    id: ConnectionId,
    /// The connection itself
    connection: Connection,
    /// Control channel sender
    control_tx: mpsc::Sender<ControlMessage>,
    /// Worker task handle
    worker_handle: JoinHandle<()>,
    /// Current state (atomic for lock-free access)
    state: Arc<AtomicU8>,
    /// When the connection was created
    created_at: Instant,
}

impl ManagedConnection {
    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            state: self.state(),
            transport: self.connection.transport(),
            tls_state: self.connection.tls_state(),
            peer_addr: self.connection.peer_addr(),
            created_at: self.created_at,
            bytes_sent: self.connection.bytes_sent(),
            bytes_received: self.connection.bytes_received(),
            messages_sent: self.connection.messages_sent(),
            messages_received: self.connection.messages_received(),
        }
    }
}

/// Connection manager
pub struct ConnectionManager {
    /// Active connections (lock-free concurrent map)
    connections: Arc<DashMap<ConnectionId, ManagedConnection>>,
    /// Next connection ID (monotonically increasing, never reused)
    next_id: Arc<AtomicU64>,
    /// Server metrics
    metrics: Arc<ServerMetrics>,
    /// Liveness table shared with every worker
    heartbeat: Arc<Heartbeat>,
    /// Admission limiter shared with every worker
    limiter: Arc<RateLimiter>,
    /// Worker configuration
    worker_config: WorkerConfig,
}

impl ConnectionManager {
    /// Create a new connection manager
    pub fn new(
        metrics: Arc<ServerMetrics>,
        heartbeat: Arc<Heartbeat>,
        limiter: Arc<RateLimiter>,
        worker_config: WorkerConfig,
    ) -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(1)),
            metrics,
            heartbeat,
            limiter,
            worker_config,
        }
    }

    /// Allocate the next connection ID
    pub fn next_connection_id(&self) -> ConnectionId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        ConnectionId::new(id)
    }

    /// The liveness table
    pub fn heartbeat(&self) -> Arc<Heartbeat> {
        self.heartbeat.clone()
    }

    /// Add a new connection
    ///
    /// This registers the connection in the liveness table, spawns a
    /// worker task for it, and tracks it.
    pub fn add_connection(
        &self,
        connection: Connection,
        handler: Arc<dyn ServerHandler>,
    ) -> Result<ConnectionId> {
        let id = connection.id();

        // Registered before the worker can run, so the first sweep
        // after this point already sees the connection.
        self.heartbeat.register(id);

        let state = Arc::new(AtomicU8::new(ConnectionState::Connecting.as_u8()));
        let (worker, control_tx) = ConnectionWorker::new(
            id,
            connection.clone(),
            handler,
            self.worker_config.clone(),
            state.clone(),
            self.heartbeat.clone(),
            self.limiter.clone(),
        );

        let connections = self.connections.clone();
        let metrics = self.metrics.clone();
        let worker_handle = tokio::spawn(async move {
            let start = Instant::now();
            worker.run().await;

            // Cleanup after worker finishes
            connections.remove(&id);
            metrics.connection_closed(start.elapsed());
        });

        let managed = ManagedConnection {
            id,
            connection,
            control_tx,
            worker_handle,
            state,
            created_at: Instant::now(),
        };

        self.connections.insert(id, managed);
        self.metrics.connection_opened();

        Ok(id)
    }

    /// Remove a connection
    ///
    /// This sends a close message to the worker and removes it from
    /// tracking.
    pub async fn remove_connection(&self, id: ConnectionId) -> Result<()> {
        if let Some((_, managed)) = self.connections.remove(&id) {
            let _ = managed.control_tx.send(ControlMessage::Close).await;
            let _ =
                tokio::time::timeout(Duration::from_secs(5), managed.worker_handle).await;
            Ok(())
        } else {
            Err(NetError::ConnectionNotFound(id))
        }
    }

    /// Get a connection by ID
    pub fn get_connection(&self, id: ConnectionId) -> Option<Connection> {
        self.connections
            .get(&id)
            .map(|entry| entry.connection.clone())
    }

    /// Get connection info
    pub fn get_connection_info(&self, id: ConnectionId) -> Option<ConnectionInfo> {
        self.connections.get(&id).map(|entry| entry.info())
    }

    /// Get all connection infos
    pub fn get_all_connection_infos(&self) -> Vec<ConnectionInfo> {
        self.connections
            .iter()
            .map(|entry| entry.value().info())
            .collect()
    }

    /// Get the number of active connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Send a message to a specific connection
    pub async fn send_to_connection(&self, id: ConnectionId, data: Bytes) -> Result<()> {
        if let Some(managed) = self.connections.get(&id) {
            managed
                .control_tx
                .send(ControlMessage::Send(data))
                .await
                .map_err(|_| NetError::ConnectionClosed)?;
            Ok(())
        } else {
            Err(NetError::ConnectionNotFound(id))
        }
    }

    /// Broadcast a message to all connections
    ///
    /// This sends the message to all active connections concurrently.
    /// Returns a result with statistics about the broadcast.
    pub async fn broadcast(&self, data: Bytes) -> BroadcastResult {
        let mut result = BroadcastResult::new();
        result.total = self.connections.len();

        let mut sends = Vec::new();
        for entry in self.connections.iter() {
            let id = *entry.key();
            let tx = entry.control_tx.clone();
            let payload = data.clone();

            sends.push(async move {
                match tx.send(ControlMessage::Broadcast(payload)).await {
                    Ok(_) => (id, Ok(())),
                    Err(e) => (id, Err(e.to_string())),
                }
            });
        }

        let results = futures_util::future::join_all(sends).await;

        for (id, res) in results {
            match res {
                Ok(_) => result.succeeded += 1,
                Err(e) => {
                    result.failed += 1;
                    result.errors.push((id, e));
                }
            }
        }

        result
    }

    /// Spawn the liveness sweep task
    ///
    /// Each tick collects the connections whose heartbeat deadline has
    /// passed and evicts them by closing their workers. The expiry
    /// snapshot is the commit point: a renewal that lands after it is
    /// honored on the next tick, never mid-sweep.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let connections = self.connections.clone();
        let heartbeat = self.heartbeat.clone();
        let metrics = self.metrics.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let expired = heartbeat.sweep(Instant::now());
                for id in expired {
                    if let Some(entry) = connections.get(&id) {
                        warn!(connection_id = %id, "evicting expired connection");
                        let _ = entry.control_tx.send(ControlMessage::Close).await;
                        metrics.connection_evicted();
                    }
                }
            }
        })
    }

    /// Shutdown all connections gracefully
    pub async fn shutdown(&self) {
        info!(
            connections = self.connections.len(),
            "shutting down all connections"
        );

        // Send close to all connections
        for entry in self.connections.iter() {
            let _ = entry.control_tx.send(ControlMessage::Close).await;
        }

        // Give workers time to cleanup, then abort stragglers
        tokio::time::sleep(Duration::from_millis(200)).await;
        for entry in self.connections.iter() {
            entry.worker_handle.abort();
        }

        self.connections.clear();
        debug!("connection manager shutdown complete");
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connection_count", &self.connection_count())
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish()
    }
}
