//! One independently locked partition of a TTL cache.
//!
//! Every mutation of an entry happens under the shard's write lock. Methods
//! that remove entries hand the removed pair back to the caller instead of
//! notifying anyone, so eviction listeners always run after the lock is
//! released.

use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::config::Settings;
use crate::delay_queue::DelayQueue;
use crate::entry::Entry;

/// Outcome of revalidating a key whose wake-up fired.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Tick<K, V> {
    /// The key is gone (deleted, drained, or already expired by another fire).
    Missing,
    /// The key lost its TTL since the wake-up was scheduled.
    Cleared,
    /// The key is still live; a new wake-up was scheduled at this tick.
    Rearmed(i64),
    /// The key is still live and a later pending wake-up already covers it.
    Covered,
    /// The key was due and has been removed.
    Expired(K, V),
}

pub(crate) struct Shard<K, V> {
    elements: RwLock<IndexMap<K, Entry<V>>>,
    /// Set by `drain` under the write lock; later inserts are refused.
    sealed: AtomicBool,
    settings: Arc<Settings>,
    queue: Arc<DelayQueue<K>>,
}

impl<K, V> Shard<K, V>
where
    K: Eq + Hash + Clone,
{
    pub(crate) fn new(settings: Arc<Settings>, queue: Arc<DelayQueue<K>>) -> Self {
        Self {
            elements: RwLock::new(IndexMap::new()),
            sealed: AtomicBool::new(false),
            settings,
            queue,
        }
    }

    /// Insert or overwrite `key`. A non-positive `ttl` stores it without expiry.
    ///
    /// Returns `false` once the shard has been drained.
    pub(crate) fn set_ex(&self, key: K, value: V, ttl: i64) -> bool {
        let now = self.settings.now();
        let expiration = deadline(now, ttl);

        let mut elements = self.elements.write();
        if self.is_sealed() {
            return false;
        }
        match elements.get_mut(&key) {
            Some(entry) => {
                let previous = entry.expiration;
                entry.value = value;
                entry.expiration = expiration;
                if self.needs_wakeup(previous, expiration, now) {
                    entry.armed = expiration;
                    self.queue.enqueue(key, expiration);
                }
            }
            None => {
                if expiration > 0 {
                    self.queue.enqueue(key.clone(), expiration);
                }
                elements.insert(key, Entry::new(value, expiration));
            }
        }
        true
    }

    /// Insert `key` without TTL only if it is absent.
    pub(crate) fn set_nx(&self, key: K, value: V) -> bool {
        let mut elements = self.elements.write();
        if self.is_sealed() || elements.contains_key(&key) {
            return false;
        }
        elements.insert(key, Entry::new(value, 0));
        true
    }

    /// Replace the expiration of an existing key. Returns whether it existed.
    pub(crate) fn expire<Q>(&self, key: &Q, ttl: i64) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.settings.now();
        let expiration = deadline(now, ttl);

        let mut elements = self.elements.write();
        let Some((_, stored_key, entry)) = elements.get_full_mut(key) else {
            return false;
        };
        let previous = entry.expiration;
        entry.expiration = expiration;
        if self.needs_wakeup(previous, expiration, now) {
            entry.armed = expiration;
            self.queue.enqueue(stored_key.clone(), expiration);
        }
        true
    }

    /// Presence check. Expired entries that have not been reclaimed count.
    pub(crate) fn exists<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.elements.read().contains_key(key)
    }

    /// Read a live value, sliding its expiration forward when hit-TTL applies.
    pub(crate) fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        let now = self.settings.now();
        let hit_ttl = self.settings.hit_ttl;

        if hit_ttl <= 0 {
            let elements = self.elements.read();
            return elements
                .get(key)
                .filter(|entry| !entry.is_expired_at(now))
                .map(|entry| entry.value.clone());
        }

        let mut elements = self.elements.write();
        let entry = elements.get_mut(key)?;
        if entry.is_expired_at(now) {
            return None;
        }
        // The pending wake-up will find the later deadline and re-arm itself.
        if entry.has_ttl() && entry.remaining(now) < hit_ttl {
            entry.expiration = entry.expiration.saturating_add(hit_ttl);
        }
        Some(entry.value.clone())
    }

    /// Live expiration of `key`: `Some(0)` without TTL, `None` if absent or expired.
    pub(crate) fn expiration<Q>(&self, key: &Q) -> Option<i64>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.settings.now();
        self.elements
            .read()
            .get(key)
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| entry.expiration)
    }

    /// Remove `key`, returning the stored pair.
    pub(crate) fn remove<Q>(&self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.elements
            .write()
            .swap_remove_entry(key)
            .map(|(key, entry)| (key, entry.value))
    }

    /// Revalidate `key` after its wake-up scheduled at `due` fired, and
    /// remove it if it is due.
    pub(crate) fn expire_tick(&self, key: &K, due: i64) -> Tick<K, V> {
        let now = self.settings.now();
        let mut elements = self.elements.write();

        let Some(entry) = elements.get_mut(key) else {
            return Tick::Missing;
        };
        if !entry.has_ttl() {
            return Tick::Cleared;
        }
        if !entry.is_expired_at(now) {
            if entry.is_covered_after(due) {
                return Tick::Covered;
            }
            let next = entry.expiration;
            entry.armed = next;
            self.queue.enqueue(key.clone(), next);
            return Tick::Rearmed(next);
        }

        match elements.swap_remove_entry(key) {
            Some((key, entry)) => Tick::Expired(key, entry.value),
            None => Tick::Missing,
        }
    }

    /// Whether a renewal from `previous` to `next` must schedule its own wake-up.
    ///
    /// An outstanding wake-up at or before `previous` covers any later
    /// deadline because it re-arms when it fires. A sooner deadline, a
    /// previously unset one, or one that was about to fire is not covered.
    fn needs_wakeup(&self, previous: i64, next: i64, now: i64) -> bool {
        next > 0
            && (previous <= 0
                || next < previous
                || previous - now < self.settings.renew_threshold)
    }
}

impl<K, V> Shard<K, V> {
    /// Remove every entry, in insertion order, and refuse later inserts.
    pub(crate) fn drain(&self) -> Vec<(K, V)> {
        let mut elements = self.elements.write();
        self.sealed.store(true, Ordering::Relaxed);
        elements
            .drain(..)
            .map(|(key, entry)| (key, entry.value))
            .collect()
    }

    // Only read and written under the elements lock.
    fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Relaxed)
    }

    pub(crate) fn len(&self) -> usize {
        self.elements.read().len()
    }
}

fn deadline(now: i64, ttl: i64) -> i64 {
    if ttl > 0 {
        now.saturating_add(ttl)
    } else {
        0
    }
}
