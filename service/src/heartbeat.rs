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

//! Central liveness table
//!
//! Every connection holds one entry keyed by its [`ConnectionId`]; the
//! entry carries a deadline that is pushed forward on every renewal. A
//! single process-wide sweep task collects the expired entries each
//! tick and evicts them. Expiry is judged against one timestamp per
//! tick, so a connection whose renewal races the sweep is kept if the
//! renewal lands before the snapshot and evicted otherwise.

use crate::types::ConnectionId;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::trace;

/// Liveness table with TTL-based expiry
#[derive(Debug)]
pub struct Heartbeat {
    entries: DashMap<ConnectionId, Instant>,
    ttl: Duration,
}

impl Heartbeat {
    /// Create a table with the given time-to-live per entry
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// The configured time-to-live
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Register a connection, giving it a full TTL from now
    pub fn register(&self, id: ConnectionId) {
        self.entries.insert(id, Instant::now() + self.ttl);
        trace!(%id, "heartbeat registered");
    }

    /// Push a connection's deadline forward by a full TTL
    ///
    /// Renewing an unregistered connection is a no-op: a connection
    /// that was already evicted must not resurrect itself.
    pub fn renew(&self, id: ConnectionId) {
        if let Some(mut entry) = self.entries.get_mut(&id) {
            *entry = Instant::now() + self.ttl;
        }
    }

    /// Remove a connection from the table
    pub fn deregister(&self, id: ConnectionId) {
        self.entries.remove(&id);
        trace!(%id, "heartbeat deregistered");
    }

    /// Whether a connection is currently registered
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of registered connections
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Collect and remove every entry expired as of `now`
    ///
    /// The snapshot against one `now` is the commit point of the tick:
    /// renewals that land after it take effect on the next tick.
    pub fn sweep(&self, now: Instant) -> Vec<ConnectionId> {
        let expired: Vec<ConnectionId> = self
            .entries
            .iter()
            .filter(|entry| *entry.value() <= now)
            .map(|entry| *entry.key())
            .collect();
        for id in &expired {
            self.entries.remove(id);
        }
        if !expired.is_empty() {
            trace!(count = expired.len(), "heartbeat sweep evicted entries");
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_sweep_expiry() {
        let hb = Heartbeat::new(Duration::from_millis(50));
        let id = ConnectionId::new(1);
        hb.register(id);
        assert!(hb.contains(id));

        // Not yet expired
        assert!(hb.sweep(Instant::now()).is_empty());

        // Past the deadline
        let expired = hb.sweep(Instant::now() + Duration::from_millis(100));
        assert_eq!(expired, vec![id]);
        assert!(!hb.contains(id));
    }

    #[test]
    fn test_renew_pushes_deadline() {
        let hb = Heartbeat::new(Duration::from_millis(50));
        let id = ConnectionId::new(1);
        hb.register(id);

        std::thread::sleep(Duration::from_millis(30));
        hb.renew(id);

        // The original deadline has passed but the renewal holds
        std::thread::sleep(Duration::from_millis(30));
        assert!(hb.sweep(Instant::now()).is_empty());
        assert!(hb.contains(id));
    }

    #[test]
    fn test_renew_after_eviction_is_noop() {
        let hb = Heartbeat::new(Duration::from_millis(10));
        let id = ConnectionId::new(1);
        hb.register(id);
        hb.sweep(Instant::now() + Duration::from_secs(1));
        assert!(!hb.contains(id));

        hb.renew(id);
        assert!(!hb.contains(id));
    }

    #[test]
    fn test_sweep_only_takes_expired() {
        let hb = Heartbeat::new(Duration::from_millis(50));
        let stale = ConnectionId::new(1);
        hb.register(stale);
        std::thread::sleep(Duration::from_millis(60));
        let fresh = ConnectionId::new(2);
        hb.register(fresh);

        let expired = hb.sweep(Instant::now());
        assert_eq!(expired, vec![stale]);
        assert!(hb.contains(fresh));
        assert_eq!(hb.len(), 1);
    }

    #[test]
    fn test_deregister() {
        let hb = Heartbeat::new(Duration::from_secs(60));
        let id = ConnectionId::new(7);
        hb.register(id);
        hb.deregister(id);
        assert!(hb.is_empty());
        assert!(hb.sweep(Instant::now() + Duration::from_secs(120)).is_empty());
    }
}
