//! Configuration for the TTL and LRU caches.
//!
//! This module provides builders in the same shape for both caches. Zero
//! values mean "disabled" or "use the default", so a builder can be fed
//! straight from user-supplied numbers.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::{span, Clock, SystemClock};
use crate::error::{CacheError, CacheResult};

/// Default number of shards in a TTL cache.
pub const DEFAULT_SHARD_COUNT: usize = 32;

/// Default renewal threshold, in clock ticks.
pub const DEFAULT_RENEW_THRESHOLD: i64 = 3;

/// Default LRU capacity.
pub const DEFAULT_LRU_SIZE: usize = 512;

/// Configuration for creating a new TTL cache.
///
/// ```
/// use shard_cache::{CacheConfig, SystemClock};
/// use std::time::Duration;
///
/// let config = CacheConfig::new()
///     .shard_count(16)
///     .hit_ttl(Duration::from_secs(5))
///     .clock(SystemClock::millis())
///     .build();
/// assert_eq!(config.get_shard_count(), 16);
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Number of independently locked partitions.
    pub(crate) shard_count: usize,

    /// Extension applied to an entry read shortly before it expires.
    /// `None` disables sliding expiration.
    pub(crate) hit_ttl: Option<Duration>,

    /// Renewals whose previous remaining TTL is below this many ticks always
    /// schedule a fresh wake-up.
    pub(crate) renew_threshold: i64,

    /// Source of time for expirations.
    pub(crate) clock: Arc<dyn Clock>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            shard_count: DEFAULT_SHARD_COUNT,
            hit_ttl: None,
            renew_threshold: DEFAULT_RENEW_THRESHOLD,
            clock: Arc::new(SystemClock::seconds()),
        }
    }
}

impl CacheConfig {
    /// Create a new configuration builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of shards. Zero is rejected when the cache is built.
    pub fn shard_count(mut self, count: usize) -> Self {
        self.shard_count = count;
        self
    }

    /// Set the sliding expiration applied on reads.
    ///
    /// A hit on an entry with less than `ttl` left extends its expiration by
    /// `ttl`. `Duration::ZERO` disables it.
    pub fn hit_ttl(mut self, ttl: Duration) -> Self {
        self.hit_ttl = if ttl.is_zero() { None } else { Some(ttl) };
        self
    }

    /// Set the renewal threshold in clock ticks.
    pub fn renew_threshold(mut self, ticks: i64) -> Self {
        self.renew_threshold = ticks;
        self
    }

    /// Set the time provider.
    pub fn clock<C: Clock>(self, clock: C) -> Self {
        self.shared_clock(Arc::new(clock))
    }

    /// Set a time provider the caller keeps a handle to.
    pub fn shared_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build the final configuration.
    pub fn build(self) -> Self {
        self
    }

    /// Get the shard count.
    pub fn get_shard_count(&self) -> usize {
        self.shard_count
    }

    /// Get the hit TTL, if set.
    pub fn get_hit_ttl(&self) -> Option<Duration> {
        self.hit_ttl
    }

    pub(crate) fn validate(&self) -> CacheResult<()> {
        if self.shard_count == 0 {
            return Err(CacheError::InvalidConfig(
                "shard count must be at least 1".to_string(),
            ));
        }
        if u32::try_from(self.shard_count).is_err() {
            return Err(CacheError::InvalidConfig(format!(
                "shard count {} exceeds the sharding range",
                self.shard_count
            )));
        }
        if self.renew_threshold < 0 {
            return Err(CacheError::InvalidConfig(format!(
                "renew threshold must not be negative, got {}",
                self.renew_threshold
            )));
        }
        Ok(())
    }
}

/// Settings resolved from a [`CacheConfig`], shared read-only by every shard.
#[derive(Debug)]
pub(crate) struct Settings {
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) hit_ttl: i64,
    pub(crate) renew_threshold: i64,
}

impl Settings {
    pub(crate) fn from_config(config: &CacheConfig) -> Self {
        let clock = Arc::clone(&config.clock);
        let hit_ttl = config.hit_ttl.map_or(0, |ttl| to_ticks(ttl, clock.unit()));
        Self {
            clock,
            hit_ttl,
            renew_threshold: config.renew_threshold,
        }
    }

    pub(crate) fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Convert a duration into ticks, rounding up.
    pub(crate) fn ticks(&self, duration: Duration) -> i64 {
        to_ticks(duration, self.clock.unit())
    }

    /// Convert ticks back into a duration.
    pub(crate) fn duration(&self, ticks: i64) -> Duration {
        span(self.clock.unit(), ticks)
    }
}

fn to_ticks(duration: Duration, unit: Duration) -> i64 {
    let unit = unit.as_nanos().max(1);
    let ticks = (duration.as_nanos() + unit - 1) / unit;
    i64::try_from(ticks).unwrap_or(i64::MAX)
}

/// Configuration for creating a new LRU cache.
///
/// ```
/// use shard_cache::LruConfig;
///
/// let config = LruConfig::new().max_size(1000).init_size(64).build();
/// assert_eq!(config.get_max_size(), 1000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LruConfig {
    /// Maximum number of entries before the least recently used is evicted.
    pub(crate) max_size: usize,

    /// Capacity hint for the initial allocation.
    pub(crate) init_size: usize,
}

impl Default for LruConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_LRU_SIZE,
            init_size: 0,
        }
    }
}

impl LruConfig {
    /// Create a new configuration builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum capacity. Zero selects the default of 512.
    pub fn max_size(mut self, size: usize) -> Self {
        self.max_size = if size == 0 { DEFAULT_LRU_SIZE } else { size };
        self
    }

    /// Set the initial allocation hint.
    pub fn init_size(mut self, size: usize) -> Self {
        self.init_size = size;
        self
    }

    /// Build the final configuration, clamping the hint to the capacity.
    pub fn build(mut self) -> Self {
        self.init_size = self.init_size.min(self.max_size);
        self
    }

    /// Get the maximum capacity.
    pub fn get_max_size(&self) -> usize {
        self.max_size
    }

    /// Get the initial allocation hint.
    pub fn get_init_size(&self) -> usize {
        self.init_size
    }
}
