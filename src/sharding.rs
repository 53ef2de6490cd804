//! Key-to-shard routing.
//!
//! A sharding function maps a key to a `u32`; the cache reduces it modulo the
//! shard count. The only requirement is determinism for the lifetime of a
//! cache: the same key must always land on the same shard.
//!
//! The byte-oriented hashers accept anything that is `AsRef<[u8]>`, so a cache
//! keyed by `String` can be queried with `&str` and route identically.

/// Deterministic `key -> u32` mapping used to pick a shard.
///
/// Closures taking `&K` implement this trait:
///
/// ```
/// use shard_cache::Sharding;
///
/// let by_value = |key: &u64| (*key % 8) as u32;
/// assert_eq!(by_value.shard_of(&10u64), 2);
/// ```
pub trait Sharding<K: ?Sized>: Send + Sync + 'static {
    /// Hash `key` for shard selection.
    fn shard_of(&self, key: &K) -> u32;
}

impl<K: ?Sized, F> Sharding<K> for F
where
    F: Fn(&K) -> u32 + Send + Sync + 'static,
{
    fn shard_of(&self, key: &K) -> u32 {
        self(key)
    }
}

/// Seeded DJB-style rolling hash. The default sharding function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Djb {
    seed: u32,
}

impl Djb {
    const BASE: u32 = 5381;

    /// A hasher with a random seed, so key distribution differs per cache.
    pub fn new() -> Self {
        Self::with_seed(rand::random::<u32>())
    }

    /// A hasher with a fixed seed.
    pub fn with_seed(seed: u32) -> Self {
        Self {
            seed: seed.wrapping_add(Self::BASE),
        }
    }

    /// Hash raw bytes.
    pub fn hash(&self, bytes: &[u8]) -> u32 {
        let mut hash = self.seed.wrapping_add(bytes.len() as u32);
        for &b in bytes {
            hash = hash.wrapping_mul(33) ^ u32::from(b);
        }
        hash ^ (hash >> 16)
    }
}

impl Default for Djb {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: AsRef<[u8]> + ?Sized> Sharding<K> for Djb {
    fn shard_of(&self, key: &K) -> u32 {
        self.hash(key.as_ref())
    }
}

/// 32-bit FNV-1a.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fnv1a;

impl Fnv1a {
    const OFFSET: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    /// Hash raw bytes.
    pub fn hash(&self, bytes: &[u8]) -> u32 {
        bytes.iter().fold(Self::OFFSET, |hash, &b| {
            (hash ^ u32::from(b)).wrapping_mul(Self::PRIME)
        })
    }
}

impl<K: AsRef<[u8]> + ?Sized> Sharding<K> for Fnv1a {
    fn shard_of(&self, key: &K) -> u32 {
        self.hash(key.as_ref())
    }
}

/// BKDR hash with the classic 131 multiplier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bkdr;

impl Bkdr {
    const SEED: u32 = 131;

    /// Hash raw bytes.
    pub fn hash(&self, bytes: &[u8]) -> u32 {
        bytes.iter().fold(0u32, |hash, &b| {
            hash.wrapping_mul(Self::SEED).wrapping_add(u32::from(b))
        })
    }
}

impl<K: AsRef<[u8]> + ?Sized> Sharding<K> for Bkdr {
    fn shard_of(&self, key: &K) -> u32 {
        self.hash(key.as_ref())
    }
}
