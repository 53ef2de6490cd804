//! The sharded TTL cache.
//!
//! This module provides the primary `Cache` type. Keys are routed to one of N
//! independently locked shards; entries with a TTL are reclaimed lazily by a
//! single dispatch thread fed from a delay queue, and reads never return an
//! entry past its deadline whether or not it has been reclaimed yet.

use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::config::{CacheConfig, Settings};
use crate::delay_queue::DelayQueue;
use crate::dispatch::{spawn_dispatcher, ExpireTarget};
use crate::error::CacheResult;
use crate::shard::{Shard, Tick};
use crate::sharding::{Djb, Sharding};
use crate::stats::{CacheStats, StatsSnapshot};

/// Callback fired with the key and last value of a removed entry.
pub(crate) type EvictionListener<K, V> = Arc<dyn Fn(K, V) + Send + Sync>;

/// Remaining lifetime of a live entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// The entry has no expiration.
    Persistent,
    /// The entry expires after this long.
    Expires(Duration),
}

/// A thread-safe, sharded in-memory cache with per-entry expiration.
///
/// Cloning a `Cache` creates a new handle to the same underlying data. When
/// the last handle is dropped the cache is closed: the dispatch thread stops
/// and every remaining entry is passed to the eviction listener.
///
/// # Example
/// ```
/// use shard_cache::{Cache, CacheConfig};
/// use std::time::Duration;
///
/// let cache: Cache<String, String> = Cache::new(CacheConfig::default()).unwrap();
///
/// cache.set("user:123", "Alice");
/// assert_eq!(cache.get("user:123"), Some("Alice".to_string()));
///
/// cache.set_ex("session:abc", "data", Duration::from_secs(60));
/// assert!(!cache.set_nx("session:abc", "other"));
/// ```
pub struct Cache<K, V, S = Djb> {
    shared: Arc<Shared<K, V, S>>,
}

struct Shared<K, V, S> {
    shards: Box<[Shard<K, V>]>,
    sharding: S,
    queue: Arc<DelayQueue<K>>,
    settings: Arc<Settings>,
    listener: RwLock<Option<EvictionListener<K, V>>>,
    lifecycle: Lifecycle,
    stats: CacheStats,
}

/// Closed flag packed with the number of operations that may still notify
/// the listener.
///
/// The listener is released only when the last such operation leaves a
/// closed cache, so a removal that raced with `close` is still delivered.
struct Lifecycle {
    state: AtomicU64,
}

impl Lifecycle {
    const CLOSED: u64 = 1 << 63;

    fn new() -> Self {
        Self {
            state: AtomicU64::new(0),
        }
    }

    fn is_closed(&self) -> bool {
        self.state.load(Ordering::Acquire) & Self::CLOSED != 0
    }

    /// Register an operation. Returns whether the cache was still open; the
    /// operation must call `leave` either way.
    fn enter(&self) -> bool {
        self.state.fetch_add(1, Ordering::AcqRel) & Self::CLOSED == 0
    }

    /// Set the closed flag. Returns whether this call set it.
    fn close(&self) -> bool {
        self.state.fetch_or(Self::CLOSED, Ordering::AcqRel) & Self::CLOSED == 0
    }

    /// Returns `true` when the last operation leaves a closed cache.
    fn leave(&self) -> bool {
        self.state.fetch_sub(1, Ordering::AcqRel) == Self::CLOSED | 1
    }
}

/// An operation registered with the lifecycle. Releases the listener when it
/// is the last one out of a closed cache.
struct Section<'a, K, V, S> {
    shared: &'a Shared<K, V, S>,
    open: bool,
}

impl<K, V, S> Drop for Section<'_, K, V, S> {
    fn drop(&mut self) {
        if self.shared.lifecycle.leave() {
            // The listener may hold a handle to this cache; drop it unlocked.
            let listener = self.shared.listener.write().take();
            drop(listener);
        }
    }
}

impl<K, V> Cache<K, V, Djb>
where
    K: Eq + Hash + Clone + AsRef<[u8]> + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Create a cache routing keys with a randomly seeded [`Djb`] hash.
    ///
    /// # Errors
    /// Fails if the configuration is invalid or the dispatch thread cannot
    /// be started.
    pub fn new(config: CacheConfig) -> CacheResult<Self> {
        Self::with_sharding(config, Djb::new())
    }
}

impl<K, V, S> Cache<K, V, S>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
    S: Sharding<K>,
{
    /// Create a cache with a custom sharding function.
    ///
    /// # Example
    /// ```
    /// use shard_cache::{Cache, CacheConfig};
    ///
    /// let config = CacheConfig::new().shard_count(8).build();
    /// let cache: Cache<u64, &str, _> =
    ///     Cache::with_sharding(config, |key: &u64| (*key % 8) as u32).unwrap();
    ///
    /// cache.set(42u64, "answer");
    /// assert_eq!(cache.get(&42u64), Some("answer"));
    /// ```
    pub fn with_sharding(config: CacheConfig, sharding: S) -> CacheResult<Self> {
        config.validate()?;

        let settings = Arc::new(Settings::from_config(&config));
        let queue = Arc::new(DelayQueue::new(Arc::clone(&settings.clock)));
        let shards = (0..config.shard_count)
            .map(|_| Shard::new(Arc::clone(&settings), Arc::clone(&queue)))
            .collect();

        let shared = Arc::new(Shared {
            shards,
            sharding,
            queue: Arc::clone(&queue),
            settings,
            listener: RwLock::new(None),
            lifecycle: Lifecycle::new(),
            stats: CacheStats::new(),
        });

        spawn_dispatcher(Arc::downgrade(&shared), queue)?;
        debug!(
            shards = config.shard_count,
            hit_ttl = shared.settings.hit_ttl,
            "ttl cache started"
        );

        Ok(Self { shared })
    }

    /// Store a value without expiration.
    ///
    /// Overwriting a key that had a TTL clears it. Returns `false` only if the
    /// cache is closed. A write racing with [`close`](Self::close) either lands
    /// before the drain and is passed to the listener, or is rejected.
    pub fn set(&self, key: impl Into<K>, value: impl Into<V>) -> bool {
        self.set_ex(key, value, Duration::ZERO)
    }

    /// Store a value that expires after `ttl`.
    ///
    /// The TTL is rounded up to whole clock ticks; `Duration::ZERO` stores
    /// the value without expiration. Returns `false` only if the cache is
    /// closed.
    pub fn set_ex(&self, key: impl Into<K>, value: impl Into<V>, ttl: Duration) -> bool {
        if self.is_closed() {
            return false;
        }
        let key = key.into();
        let ttl = self.shared.settings.ticks(ttl);
        let stored = self.shared.shard_for(&key).set_ex(key, value.into(), ttl);
        if stored {
            self.shared.stats.record_set();
        }
        stored
    }

    /// Store a value without expiration only if the key is absent.
    ///
    /// Returns whether the value was stored.
    pub fn set_nx(&self, key: impl Into<K>, value: impl Into<V>) -> bool {
        if self.is_closed() {
            return false;
        }
        let key = key.into();
        let stored = self.shared.shard_for(&key).set_nx(key, value.into());
        if stored {
            self.shared.stats.record_set();
        }
        stored
    }

    /// Replace the expiration of an existing key.
    ///
    /// `Duration::ZERO` removes the expiration. Returns whether the key was
    /// present.
    pub fn expire<Q>(&self, key: &Q, ttl: Duration) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        S: Sharding<Q>,
    {
        if self.is_closed() {
            return false;
        }
        let ttl = self.shared.settings.ticks(ttl);
        self.shared.shard_for(key).expire(key, ttl)
    }

    /// Check if a key is stored.
    ///
    /// Does not look at expiration: an entry past its deadline that has not
    /// been reclaimed yet still counts. Use [`get`](Self::get) for liveness.
    pub fn exists<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        S: Sharding<Q>,
    {
        self.shared.shard_for(key).exists(key)
    }

    /// Get a copy of a live value.
    ///
    /// Returns `None` if the key is absent or past its expiration. With a
    /// hit TTL configured, a hit close to expiry extends the entry.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        S: Sharding<Q>,
        V: Clone,
    {
        let value = self.shared.shard_for(key).get(key);
        self.shared.stats.record_lookup(value.is_some());
        value
    }

    /// Remaining lifetime of a live key, or `None` if it is absent or expired.
    pub fn ttl<Q>(&self, key: &Q) -> Option<Ttl>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        S: Sharding<Q>,
    {
        let expiration = self.shared.shard_for(key).expiration(key)?;
        if expiration == 0 {
            return Some(Ttl::Persistent);
        }
        let remaining = expiration - self.shared.settings.now();
        Some(Ttl::Expires(self.shared.settings.duration(remaining)))
    }

    /// Delete a key, passing it to the eviction listener.
    ///
    /// Returns `true` if the key existed and was removed.
    pub fn del<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        S: Sharding<Q>,
    {
        let section = self.shared.enter();
        if !section.open {
            return false;
        }
        match self.shared.shard_for(key).remove(key) {
            Some((key, value)) => {
                self.shared.stats.record_delete();
                self.shared.notify(key, value);
                true
            }
            None => false,
        }
    }

    /// Register the callback fired for every entry that leaves the cache
    /// through [`del`](Self::del), expiration or [`close`](Self::close).
    ///
    /// Replaces any previous callback. The callback runs on the calling or
    /// dispatch thread with no cache lock held, so it may use the cache.
    ///
    /// A callback that captures a clone of this cache keeps it alive: dropping
    /// every other handle no longer closes it, and the dispatch thread and
    /// entries stay around until [`close`](Self::close) is called explicitly.
    /// `close` releases the callback and with it the captured handle.
    pub fn on_evicted<F>(&self, callback: F)
    where
        F: Fn(K, V) + Send + Sync + 'static,
    {
        *self.shared.listener.write() = Some(Arc::new(callback));
    }

    /// Close the cache.
    ///
    /// Stops the dispatch thread and passes every remaining entry to the
    /// eviction listener. Later writes are rejected. Returns `true` for the
    /// call that actually performed the shutdown.
    pub fn close(&self) -> bool {
        self.shared.close()
    }
}

impl<K, V, S> Cache<K, V, S> {
    /// Get the number of stored entries.
    ///
    /// This may include expired entries that have not been reclaimed yet and
    /// is approximate while other threads are writing.
    pub fn len(&self) -> usize {
        self.shared.shards.iter().map(Shard::len).sum()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.shared.lifecycle.is_closed()
    }

    /// Number of shards.
    pub fn shard_count(&self) -> usize {
        self.shared.shards.len()
    }

    /// Get a snapshot of the cache statistics.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }
}

impl<K, V, S> Shared<K, V, S> {
    fn shard_for<Q>(&self, key: &Q) -> &Shard<K, V>
    where
        Q: ?Sized,
        S: Sharding<Q>,
    {
        let index = self.sharding.shard_of(key) as usize % self.shards.len();
        &self.shards[index]
    }

    fn notify(&self, key: K, value: V) {
        // Clone out of the lock so the callback may re-register itself.
        let listener = self.listener.read().clone();
        if let Some(listener) = listener {
            listener(key, value);
        }
    }

    fn enter(&self) -> Section<'_, K, V, S> {
        let open = self.lifecycle.enter();
        Section { shared: self, open }
    }

    fn close(&self) -> bool {
        let _section = self.enter();
        if !self.lifecycle.close() {
            return false;
        }

        self.queue.close();

        let mut drained = 0usize;
        for shard in self.shards.iter() {
            for (key, value) in shard.drain() {
                self.notify(key, value);
                drained += 1;
            }
        }

        debug!(drained, "ttl cache closed");
        true
    }
}

impl<K, V, S> ExpireTarget<K> for Shared<K, V, S>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
    S: Sharding<K>,
{
    fn on_due(&self, key: &K, due: i64) {
        let section = self.enter();
        if !section.open {
            return;
        }
        match self.shard_for(key).expire_tick(key, due) {
            Tick::Expired(key, value) => {
                self.stats.record_expiration();
                trace!(due, "entry expired");
                self.notify(key, value);
            }
            Tick::Rearmed(next) => {
                self.stats.record_rearm();
                trace!(due, next, "stale wake-up rescheduled");
            }
            Tick::Missing | Tick::Cleared | Tick::Covered => {
                trace!(due, "stale wake-up dropped");
            }
        }
    }
}

impl<K, V, S> Drop for Shared<K, V, S> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<K, V, S> Clone for Cache<K, V, S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K, V, S> fmt::Debug for Cache<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("shards", &self.shared.shards.len())
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
