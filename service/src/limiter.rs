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

//! Admission control for inbound connections
//!
//! Two independent checks gate every accept, keyed by the client's IP:
//! a token bucket caps the connection *rate*, and a live counter caps
//! the number of *simultaneous* connections. Denial is a normal
//! control-flow outcome, not an error: the caller drops the socket and
//! moves on. The bucket map is bounded; when full, the least recently
//! used bucket is evicted.

use crate::config::LimiterConfig;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, warn};

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    last_used: Instant,
}

impl TokenBucket {
    fn new(capacity: u32) -> Self {
        let now = Instant::now();
        Self {
            tokens: f64::from(capacity),
            last_refill: now,
            last_used: now,
        }
    }

    fn try_take(&mut self, capacity: u32, refill_per_sec: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_per_sec).min(f64::from(capacity));
        self.last_refill = now;
        self.last_used = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Per-client connection rate and concurrency limiter
#[derive(Debug)]
pub struct RateLimiter {
    config: LimiterConfig,
    buckets: Mutex<HashMap<IpAddr, TokenBucket>>,
    live: Mutex<HashMap<IpAddr, usize>>,
}

impl RateLimiter {
    /// Create a limiter with the given configuration
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
            live: Mutex::new(HashMap::new()),
        }
    }

    /// Check whether a new connection from `addr` is within the rate
    ///
    /// Takes one token from the client's bucket. Fails closed: if the
    /// lock is poisoned the connection is denied.
    pub fn allow(&self, addr: IpAddr) -> bool {
        let Ok(mut buckets) = self.buckets.lock() else {
            warn!("rate limiter lock poisoned, denying connection");
            return false;
        };

        if !buckets.contains_key(&addr) && buckets.len() >= self.config.max_buckets {
            Self::evict_lru(&mut buckets);
        }

        let allowed = buckets
            .entry(addr)
            .or_insert_with(|| TokenBucket::new(self.config.capacity))
            .try_take(self.config.capacity, self.config.refill_per_sec);
        if !allowed {
            debug!(client = %addr, "connection rate limit exceeded");
        }
        allowed
    }

    /// Record an admitted connection against its client's live count
    ///
    /// Returns `false`, without recording, when the client is already
    /// at its simultaneous-connection cap.
    pub fn register_connection(&self, addr: IpAddr) -> bool {
        let Ok(mut live) = self.live.lock() else {
            warn!("rate limiter lock poisoned, denying connection");
            return false;
        };
        let count = live.entry(addr).or_insert(0);
        if *count >= self.config.max_connections_per_ip {
            debug!(client = %addr, count, "per-client connection cap reached");
            return false;
        }
        *count += 1;
        true
    }

    /// Release a closed connection from its client's live count
    pub fn release_connection(&self, addr: IpAddr) {
        let Ok(mut live) = self.live.lock() else {
            return;
        };
        if let Some(count) = live.get_mut(&addr) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                live.remove(&addr);
            }
        }
    }

    /// Current live connection count for a client
    pub fn live_connections(&self, addr: IpAddr) -> usize {
        self.live
            .lock()
            .map(|live| live.get(&addr).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Number of tracked token buckets
    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().map(|b| b.len()).unwrap_or(0)
    }

    fn evict_lru(buckets: &mut HashMap<IpAddr, TokenBucket>) {
        if let Some(oldest) = buckets
            .iter()
            .min_by_key(|(_, bucket)| bucket.last_used)
            .map(|(addr, _)| *addr)
        {
            buckets.remove(&oldest);
            debug!(client = %oldest, "evicted least recently used bucket");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> IpAddr {
        IpAddr::from([127, 0, 0, last])
    }

    #[test]
    fn test_burst_drains_exactly_capacity() {
        let limiter = RateLimiter::new(
            LimiterConfig::default()
                .with_capacity(3)
                .with_refill_per_sec(0.0),
        );

        assert!(limiter.allow(addr(1)));
        assert!(limiter.allow(addr(1)));
        assert!(limiter.allow(addr(1)));
        assert!(!limiter.allow(addr(1)));
    }

    #[test]
    fn test_clients_have_independent_buckets() {
        let limiter = RateLimiter::new(
            LimiterConfig::default()
                .with_capacity(1)
                .with_refill_per_sec(0.0),
        );

        assert!(limiter.allow(addr(1)));
        assert!(!limiter.allow(addr(1)));
        assert!(limiter.allow(addr(2)));
    }

    #[test]
    fn test_tokens_refill_over_time() {
        let limiter = RateLimiter::new(
            LimiterConfig::default()
                .with_capacity(1)
                .with_refill_per_sec(50.0),
        );

        assert!(limiter.allow(addr(1)));
        assert!(!limiter.allow(addr(1)));
        std::thread::sleep(std::time::Duration::from_millis(40));
        assert!(limiter.allow(addr(1)));
    }

    #[test]
    fn test_bucket_map_is_bounded() {
        let limiter = RateLimiter::new(LimiterConfig::default().with_max_buckets(4));

        for last in 1..=10u8 {
            limiter.allow(addr(last));
        }
        assert!(limiter.bucket_count() <= 4);
    }

    #[test]
    fn test_live_connection_cap() {
        let limiter = RateLimiter::new(LimiterConfig::default().with_max_connections_per_ip(2));

        assert!(limiter.register_connection(addr(1)));
        assert!(limiter.register_connection(addr(1)));
        assert!(!limiter.register_connection(addr(1)));

        limiter.release_connection(addr(1));
        assert!(limiter.register_connection(addr(1)));
        assert_eq!(limiter.live_connections(addr(1)), 2);
    }

    #[test]
    fn test_release_below_zero_is_safe() {
        let limiter = RateLimiter::new(LimiterConfig::default());
        limiter.release_connection(addr(1));
        assert_eq!(limiter.live_connections(addr(1)), 0);
    }
}
