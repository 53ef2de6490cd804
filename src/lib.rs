//! # Shard Cache
//!
//! Thread-safe in-process caches for Rust: a sharded key-value cache with
//! per-entry TTL, and a fixed-capacity LRU cache.
//!
//! ## Features
//!
//! - **Sharded locking**: Keys are routed to independently locked shards by a
//!   pluggable hash ([`Djb`] by default, or any `Fn(&K) -> u32`)
//! - **Lazy TTL reclamation**: One background thread per cache revalidates
//!   keys as their deadlines come due; reads never return expired values
//! - **Sliding expiration**: An optional hit TTL extends entries read shortly
//!   before they expire
//! - **Eviction callbacks**: Observe every entry that leaves a cache, with no
//!   cache lock held
//! - **LRU eviction**: O(1) recency tracking on an arena linked list
//! - **Statistics**: Track hits, misses, expirations, evictions, and more
//! - **Zero unsafe code**: Built entirely with safe Rust
//!
//! ## Quick Start
//!
//! ```rust
//! use shard_cache::{Cache, CacheConfig, SystemClock, Ttl};
//! use std::time::Duration;
//!
//! let config = CacheConfig::new()
//!     .shard_count(16)
//!     .clock(SystemClock::millis())
//!     .build();
//!
//! let cache: Cache<String, String> = Cache::new(config).unwrap();
//!
//! cache.set("user:123", "Alice");
//! assert_eq!(cache.get("user:123"), Some("Alice".to_string()));
//!
//! cache.set_ex("session:abc", "session_data", Duration::from_secs(60));
//! assert!(matches!(cache.ttl("session:abc"), Some(Ttl::Expires(_))));
//!
//! cache.on_evicted(|key, value| println!("{} left the cache ({})", key, value));
//! cache.del("user:123");
//!
//! let stats = cache.stats();
//! println!("Hit rate: {:.1}%", stats.hit_rate);
//! ```
//!
//! ## Thread Safety
//!
//! Both caches are safe to share across threads. Cloning a handle points at
//! the same underlying data; the TTL cache closes itself when the last handle
//! is dropped:
//!
//! ```rust
//! use shard_cache::LruCache;
//! use std::thread;
//!
//! let cache: LruCache<String, String> = LruCache::new(1024);
//!
//! let handles: Vec<_> = (0..4).map(|i| {
//!     let cache = cache.clone();
//!     thread::spawn(move || {
//!         cache.set(format!("key_{}", i), format!("value_{}", i));
//!     })
//! }).collect();
//!
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//! assert_eq!(cache.len(), 4);
//! ```

// Public API
pub mod cache;
pub mod clock;
pub mod config;
pub mod delay_queue;
pub mod error;
pub mod lru;
pub mod sharding;
pub mod stats;

pub use cache::{Cache, Ttl};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, LruConfig};
pub use delay_queue::DelayQueue;
pub use error::{CacheError, CacheResult};
pub use lru::LruCache;
pub use sharding::{Bkdr, Djb, Fnv1a, Sharding};
pub use stats::{CacheStats, StatsSnapshot};

// Internal modules - not part of public API
pub(crate) mod dispatch;
pub(crate) mod entry;
pub(crate) mod list;
pub(crate) mod shard;
