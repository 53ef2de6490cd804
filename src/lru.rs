//! Fixed-capacity least-recently-used cache.
//!
//! A single mutex guards a key index and an arena linked list ordered from
//! most to least recently used. When an insertion pushes the cache over
//! capacity the back entry is evicted in the same critical section, and the
//! eviction listener runs after the lock is released.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::trace;

use crate::cache::EvictionListener;
use crate::config::LruConfig;
use crate::list::{List, NodeId};
use crate::stats::{CacheStats, StatsSnapshot};

/// A thread-safe LRU cache.
///
/// Cloning an `LruCache` creates a new handle to the same underlying data.
///
/// # Example
/// ```
/// use shard_cache::LruCache;
///
/// let cache: LruCache<&str, i32> = LruCache::new(2);
/// cache.set("a", 1);
/// cache.set("b", 2);
/// cache.get("a");
/// cache.set("c", 3);
///
/// assert!(!cache.exists("b"));
/// assert_eq!(cache.keys(), vec!["c", "a"]);
/// ```
pub struct LruCache<K, V> {
    inner: Arc<LruInner<K, V>>,
}

struct LruInner<K, V> {
    state: Mutex<LruState<K, V>>,
    listener: RwLock<Option<EvictionListener<K, V>>>,
    stats: CacheStats,
}

struct LruState<K, V> {
    capacity: usize,
    index: HashMap<K, NodeId>,
    list: List<K, V>,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create a cache holding at most `capacity` entries. Zero selects the
    /// default capacity.
    pub fn new(capacity: usize) -> Self {
        Self::with_config(LruConfig::new().max_size(capacity).build())
    }

    /// Create a cache from a configuration.
    pub fn with_config(config: LruConfig) -> Self {
        let state = LruState {
            capacity: config.max_size,
            index: HashMap::with_capacity(config.init_size),
            list: List::with_capacity(config.init_size),
        };
        Self {
            inner: Arc::new(LruInner {
                state: Mutex::new(state),
                listener: RwLock::new(None),
                stats: CacheStats::new(),
            }),
        }
    }

    /// Insert or update a value and mark it most recently used.
    ///
    /// Evicts the least recently used entry when the cache is full. Always
    /// returns `true`.
    pub fn set(&self, key: impl Into<K>, value: impl Into<V>) -> bool {
        let key = key.into();
        let value = value.into();

        let evicted = {
            let mut state = self.inner.state.lock();
            let state = &mut *state;
            match state.index.get(&key).copied() {
                Some(id) => {
                    *state.list.value_mut(id) = value;
                    state.list.move_to_front(id);
                    None
                }
                None => {
                    let id = state.list.push_front(key.clone(), value);
                    state.index.insert(key, id);
                    if state.list.len() > state.capacity {
                        state.evict_back()
                    } else {
                        None
                    }
                }
            }
        };

        self.inner.stats.record_set();
        if let Some((key, value)) = evicted {
            self.inner.stats.record_eviction();
            trace!("lru entry evicted");
            self.inner.notify(key, value);
        }
        true
    }

    /// Get a copy of a value and mark it most recently used.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        let value = {
            let mut state = self.inner.state.lock();
            match state.index.get(key).copied() {
                Some(id) => {
                    state.list.move_to_front(id);
                    Some(state.list.value(id).clone())
                }
                None => None,
            }
        };
        self.inner.stats.record_lookup(value.is_some());
        value
    }

    /// Check if a key is present without touching its recency.
    pub fn exists<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.state.lock().index.contains_key(key)
    }

    /// Remove a key, passing it to the eviction listener.
    ///
    /// Returns `true` if the key existed.
    pub fn del<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let removed = {
            let mut state = self.inner.state.lock();
            let state = &mut *state;
            state
                .index
                .remove(key)
                .map(|id| state.list.remove(id))
        };
        match removed {
            Some((key, value)) => {
                self.inner.stats.record_delete();
                self.inner.notify(key, value);
                true
            }
            None => false,
        }
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> Vec<K> {
        let state = self.inner.state.lock();
        state.list.iter().map(|(key, _)| key.clone()).collect()
    }

    /// Register the callback fired for entries removed by capacity eviction
    /// or [`del`](Self::del). Replaces any previous callback.
    pub fn on_evicted<F>(&self, callback: F)
    where
        F: Fn(K, V) + Send + Sync + 'static,
    {
        *self.inner.listener.write() = Some(Arc::new(callback));
    }
}

impl<K, V> LruCache<K, V> {
    /// Get the number of entries.
    pub fn len(&self) -> usize {
        self.inner.state.lock().list.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.inner.state.lock().capacity
    }

    /// Get a snapshot of the cache statistics.
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }
}

impl<K, V> LruState<K, V>
where
    K: Eq + Hash,
{
    fn evict_back(&mut self) -> Option<(K, V)> {
        let (key, value) = self.list.pop_back()?;
        self.index.remove(&key);
        Some((key, value))
    }
}

impl<K, V> LruInner<K, V> {
    fn notify(&self, key: K, value: V) {
        let listener = self.listener.read().clone();
        if let Some(listener) = listener {
            listener(key, value);
        }
    }
}

impl<K, V> Clone for LruCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: Eq + Hash + Clone, V> Default for LruCache<K, V> {
    fn default() -> Self {
        Self::with_config(LruConfig::default())
    }
}

impl<K, V> fmt::Debug for LruCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("LruCache")
            .field("len", &state.list.len())
            .field("capacity", &state.capacity)
            .finish()
    }
}
