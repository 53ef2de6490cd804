//! Integration tests for the cache library.

use parking_lot::Mutex;
use shard_cache::{
    Bkdr, Cache, CacheConfig, CacheError, Fnv1a, LruCache, LruConfig, ManualClock, SystemClock,
    Ttl,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

type Evictions<K, V> = Arc<Mutex<Vec<(K, V)>>>;

fn record_evictions(cache: &Cache<String, String>) -> Evictions<String, String> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    cache.on_evicted(move |k, v| sink.lock().push((k, v)));
    seen
}

fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn pair(k: &str, v: &str) -> (String, String) {
    (k.to_string(), v.to_string())
}

#[test]
fn test_basic_workflow() {
    init_tracing();
    let cache: Cache<String, String> = Cache::new(CacheConfig::default()).unwrap();

    // Initially empty
    assert!(cache.is_empty());
    assert_eq!(cache.shard_count(), 32);

    cache.set("key1", "value1");
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get("key1"), Some("value1".to_string()));
    assert_eq!(cache.ttl("key1"), Some(Ttl::Persistent));

    assert!(cache.exists("key1"));
    assert!(!cache.exists("nonexistent"));
    assert_eq!(cache.ttl("nonexistent"), None);

    assert!(cache.del("key1"));
    assert!(!cache.exists("key1"));
    assert!(!cache.del("key1"));

    assert!(cache.close());
}

#[test]
fn test_expired_entry_is_evicted() {
    init_tracing();
    let config = CacheConfig::new().shard_count(1).build();
    let cache: Cache<String, String> = Cache::new(config).unwrap();
    let seen = record_evictions(&cache);

    cache.set_ex("k1", "v1", Duration::from_secs(2));
    thread::sleep(Duration::from_secs(3));

    assert_eq!(cache.get("k1"), None);
    assert!(eventually(Duration::from_secs(2), || !seen.lock().is_empty()));
    assert_eq!(*seen.lock(), vec![pair("k1", "v1")]);
}

#[test]
fn test_overwrite_without_ttl_survives() {
    let config = CacheConfig::new().shard_count(1).build();
    let cache: Cache<String, String> = Cache::new(config).unwrap();
    let seen = record_evictions(&cache);

    cache.set_ex("k1", "v1", Duration::from_secs(2));
    cache.set("k1", "v2");
    thread::sleep(Duration::from_secs(3));

    assert_eq!(cache.get("k1"), Some("v2".to_string()));
    assert!(seen.lock().is_empty());
}

#[test]
fn test_millisecond_clock_expiration() {
    let config = CacheConfig::new().clock(SystemClock::millis()).build();
    let cache: Cache<String, String> = Cache::new(config).unwrap();
    let seen = record_evictions(&cache);

    cache.set_ex("short", "a", Duration::from_millis(30));
    cache.set_ex("long", "b", Duration::from_secs(60));
    cache.set("forever", "c");

    assert!(eventually(Duration::from_secs(2), || seen.lock().len() == 1));
    assert_eq!(*seen.lock(), vec![pair("short", "a")]);
    assert!(cache.exists("long"));
    assert!(cache.exists("forever"));
    assert_eq!(cache.stats().expirations, 1);
}

#[test]
fn test_renewal_postpones_expiration() {
    let clock = Arc::new(ManualClock::new());
    let config = CacheConfig::new().shared_clock(clock.clone()).build();
    let cache: Cache<String, String> = Cache::new(config).unwrap();
    let seen = record_evictions(&cache);

    cache.set_ex("k", "v1", Duration::from_secs(20));
    cache.set_ex("k", "v2", Duration::from_secs(50));

    clock.advance(20);
    assert!(eventually(Duration::from_secs(2), || cache.stats().rearms == 1));
    assert_eq!(cache.get("k"), Some("v2".to_string()));
    assert!(seen.lock().is_empty());

    clock.advance(30);
    assert!(eventually(Duration::from_secs(2), || seen.lock().len() == 1));
    assert_eq!(*seen.lock(), vec![pair("k", "v2")]);
}

#[test]
fn test_shortened_ttl_fires_early() {
    let clock = Arc::new(ManualClock::new());
    let config = CacheConfig::new().shared_clock(clock.clone()).build();
    let cache: Cache<String, String> = Cache::new(config).unwrap();
    let seen = record_evictions(&cache);

    cache.set_ex("k", "v", Duration::from_secs(100));
    assert!(cache.expire("k", Duration::from_secs(5)));
    assert_eq!(cache.ttl("k"), Some(Ttl::Expires(Duration::from_secs(5))));

    clock.advance(5);
    assert!(eventually(Duration::from_secs(2), || seen.lock().len() == 1));
    assert!(!cache.exists("k"));
}

#[test]
fn test_hit_ttl_keeps_hot_entries() {
    let clock = Arc::new(ManualClock::new());
    let config = CacheConfig::new()
        .hit_ttl(Duration::from_secs(10))
        .shared_clock(clock.clone())
        .build();
    let cache: Cache<String, String> = Cache::new(config).unwrap();

    cache.set_ex("hot", "1", Duration::from_secs(5));
    cache.set_ex("cold", "2", Duration::from_secs(5));

    for _ in 0..4 {
        clock.advance(4);
        assert_eq!(cache.get("hot"), Some("1".to_string()));
    }

    assert_eq!(cache.get("cold"), None);
    assert!(eventually(Duration::from_secs(2), || !cache.exists("cold")));
    assert!(cache.exists("hot"));
}

#[test]
fn test_listener_may_delete_other_keys() {
    let cache: Cache<String, String> = Cache::new(CacheConfig::default()).unwrap();
    let handle = cache.clone();
    cache.on_evicted(move |key: String, _| {
        if let Some(rest) = key.strip_prefix("parent:") {
            handle.del(format!("child:{}", rest).as_str());
        }
    });

    cache.set("parent:1", "p");
    cache.set("child:1", "c");
    cache.set("child:2", "c");

    assert!(cache.del("parent:1"));
    assert!(!cache.exists("child:1"));
    assert!(cache.exists("child:2"));

    // Clears the listener and with it the cycle through `handle`.
    cache.close();
}

#[test]
fn test_close_and_drop_drain_entries() {
    let cache: Cache<String, String> = Cache::new(CacheConfig::default()).unwrap();
    let seen = record_evictions(&cache);
    for i in 0..10 {
        cache.set(format!("key_{}", i), "v");
    }

    assert!(cache.close());
    assert_eq!(seen.lock().len(), 10);
    assert!(!cache.set("late", "v"));

    let cache: Cache<String, String> = Cache::new(CacheConfig::default()).unwrap();
    let seen = record_evictions(&cache);
    cache.set_ex("a", "1", Duration::from_secs(3600));
    drop(cache);
    assert_eq!(*seen.lock(), vec![pair("a", "1")]);
}

#[test]
fn test_callbacks_fire_exactly_once_across_close() {
    init_tracing();
    let config = CacheConfig::new()
        .shard_count(4)
        .clock(SystemClock::millis())
        .build();
    let cache: Cache<String, usize> = Cache::new(config).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let sink = Arc::clone(&seen);
        cache.on_evicted(move |key: String, _| sink.lock().push(key));
    }

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let cache = cache.clone();
            thread::spawn(move || {
                let mut stored = Vec::new();
                for i in 0..100_000usize {
                    let key = format!("t{}_{}", t, i);
                    let ok = match i % 3 {
                        0 => cache.set(key.as_str(), i),
                        _ => cache.set_ex(
                            key.as_str(),
                            i,
                            Duration::from_millis(1 + (i % 3) as u64),
                        ),
                    };
                    if !ok {
                        break;
                    }
                    stored.push(key);
                    if i % 7 == 0 {
                        cache.del(stored[i / 2].as_str());
                    }
                }
                stored
            })
        })
        .collect();

    // Close while writers are mid-flight and wake-ups are still pending.
    thread::sleep(Duration::from_millis(20));
    assert!(cache.close());

    let mut stored = HashSet::new();
    for handle in handles {
        stored.extend(handle.join().unwrap());
    }

    let seen = seen.lock();
    let unique: HashSet<String> = seen.iter().cloned().collect();
    assert_eq!(unique.len(), seen.len(), "an entry was reported twice");
    assert_eq!(unique, stored);
    assert!(cache.is_empty());
}

#[test]
fn test_nanosecond_clock_keeps_long_ttls() {
    let config = CacheConfig::new().clock(SystemClock::nanos()).build();
    let cache: Cache<String, String> = Cache::new(config).unwrap();
    let seen = record_evictions(&cache);

    cache.set_ex("long", "v", Duration::from_secs(60));
    cache.set_ex("short", "v", Duration::from_millis(20));

    match cache.ttl("long") {
        Some(Ttl::Expires(left)) => assert!(left > Duration::from_secs(50), "ttl was {:?}", left),
        other => panic!("unexpected ttl {:?}", other),
    }
    assert!(eventually(Duration::from_secs(2), || seen.lock().len() == 1));
    assert_eq!(*seen.lock(), vec![pair("short", "v")]);
    assert!(cache.exists("long"));
}

#[test]
fn test_concurrent_mixed_workload() {
    let config = CacheConfig::new()
        .shard_count(8)
        .clock(SystemClock::millis())
        .build();
    let cache: Cache<String, String> = Cache::new(config).unwrap();
    let evicted = Arc::new(Mutex::new(0usize));
    {
        let evicted = Arc::clone(&evicted);
        cache.on_evicted(move |_, _| *evicted.lock() += 1);
    }

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let cache = cache.clone();
            thread::spawn(move || {
                for i in 0..500 {
                    let key = format!("t{}_{}", t, i % 50);
                    match i % 4 {
                        0 => {
                            cache.set_ex(key.as_str(), "x", Duration::from_millis(5));
                        }
                        1 => {
                            cache.set(key.as_str(), "y");
                        }
                        2 => {
                            cache.get(key.as_str());
                        }
                        _ => {
                            cache.del(key.as_str());
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let stats = cache.stats();
    assert_eq!(stats.sets, 8 * 250);
    assert_eq!(stats.hits + stats.misses, 8 * 125);

    let remaining = cache.len();
    cache.close();
    assert!(*evicted.lock() >= remaining);
}

#[test]
fn test_integer_keys_with_custom_sharding() {
    let config = CacheConfig::new().shard_count(4).build();
    let cache: Cache<u64, &str, _> =
        Cache::with_sharding(config, |key: &u64| (*key % 4) as u32).unwrap();

    for i in 0..100u64 {
        cache.set(i, "v");
    }
    assert_eq!(cache.len(), 100);
    assert_eq!(cache.get(&42u64), Some("v"));
    assert!(cache.del(&42u64));
    assert!(!cache.exists(&42u64));
}

#[test]
fn test_alternative_hashers() {
    let fnv: Cache<String, u32, Fnv1a> =
        Cache::with_sharding(CacheConfig::default(), Fnv1a).unwrap();
    let bkdr: Cache<String, u32, Bkdr> =
        Cache::with_sharding(CacheConfig::default(), Bkdr).unwrap();

    for i in 0..50u32 {
        fnv.set(format!("k{}", i), i);
        bkdr.set(format!("k{}", i), i);
    }
    assert_eq!(fnv.get("k7"), Some(7));
    assert_eq!(bkdr.get("k7"), Some(7));
}

#[test]
fn test_invalid_config_rejected() {
    let result: Result<Cache<String, String>, _> =
        Cache::new(CacheConfig::new().renew_threshold(-1));
    assert!(matches!(result, Err(CacheError::InvalidConfig(_))));
}

#[test]
fn test_lru_scenario() {
    let cache: LruCache<String, i32> = LruCache::new(2);
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        cache.on_evicted(move |k, v| seen.lock().push((k, v)));
    }

    cache.set("a", 1);
    cache.set("b", 2);
    assert_eq!(cache.get("a"), Some(1));
    cache.set("c", 3);

    assert!(!cache.exists("b"));
    assert!(cache.exists("a"));
    assert!(cache.exists("c"));
    assert_eq!(*seen.lock(), vec![("b".to_string(), 2)]);
}

#[test]
fn test_lru_shared_across_threads() {
    let config = LruConfig::new().max_size(100).init_size(16).build();
    let cache: LruCache<String, usize> = LruCache::with_config(config);

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let cache = cache.clone();
            thread::spawn(move || {
                for i in 0..200usize {
                    cache.set(format!("t{}_{}", t, i), i);
                    cache.get(format!("t{}_{}", t, i / 2).as_str());
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(cache.len(), 100);
    let stats = cache.stats();
    assert_eq!(stats.sets, 800);
    assert_eq!(stats.evictions, 700);
}
