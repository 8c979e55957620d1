//! Connection rate limiting for giftsync-relay.
//!
//! New WebSocket upgrades are limited per peer IP address with a governor
//! keyed limiter backed by DashMap. Batches are never rate limited: there is
//! no acknowledgement frame, so a dropped batch would silently split the
//! sender from everyone else.

use crate::config::LimitsConfig;
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Type alias for a keyed rate limiter using DashMap.
type KeyedLimiter<K> = RateLimiter<
    K,
    dashmap::DashMap<K, InMemoryState>,
    DefaultClock,
    NoOpMiddleware<governor::clock::QuantaInstant>,
>;

/// Rate limiters for the relay server.
#[derive(Clone)]
pub struct RateLimits {
    /// Limits connection attempts per peer IP.
    connection_limiter: Arc<KeyedLimiter<IpAddr>>,
}

impl std::fmt::Debug for RateLimits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimits")
            .field("tracked_ips", &self.connection_keys_count())
            .finish()
    }
}

impl RateLimits {
    /// Create rate limiters from configuration.
    ///
    /// A zero quota is rejected by [`crate::config::Config::validate`]; if
    /// one slips through it is treated as one per minute.
    pub fn new(config: &LimitsConfig) -> Self {
        let connections = NonZeroU32::new(config.connections_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            connection_limiter: Arc::new(RateLimiter::keyed(Quota::per_minute(connections))),
        }
    }

    /// Check if a connection attempt from `ip` is allowed.
    pub fn check_connection(&self, ip: IpAddr) -> Result<(), RateLimitError> {
        self.connection_limiter
            .check_key(&ip)
            .map_err(|_| RateLimitError::ConnectionLimitExceeded)
    }

    /// Number of addresses currently tracked.
    pub fn connection_keys_count(&self) -> usize {
        self.connection_limiter.len()
    }

    /// Evict addresses whose quota has fully recharged.
    ///
    /// The compaction task calls this every cycle.
    pub fn shrink(&self) {
        self.connection_limiter.retain_recent();
    }
}

/// Rate limit error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    /// Too many connection attempts from this address.
    #[error("connection rate limit exceeded")]
    ConnectionLimitExceeded,
}
