use std::time::Duration;

use turnloom::cache::{CacheConfig, CachedResponse, Fingerprint, ResponseCache};

fn response(text: &str) -> CachedResponse {
    CachedResponse {
        model: "mock-small".to_string(),
        text: text.to_string(),
        input_tokens: 100,
        output_tokens: 20,
        unit_cost: 0.08,
    }
}

#[test]
fn fingerprint_is_deterministic_over_model_and_prompt() {
    let a = Fingerprint::compute("mock-small", "prompt one");
    let b = Fingerprint::compute("mock-small", "prompt one");
    let c = Fingerprint::compute("mock-small", "prompt two");
    let d = Fingerprint::compute("mock-large", "prompt one");
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_ne!(a, d);
}

#[test]
fn entry_is_hit_before_ttl_and_miss_after() {
    let cache = ResponseCache::new(CacheConfig {
        ttl: Duration::from_millis(60),
        ..CacheConfig::default()
    });
    let fp = Fingerprint::compute("mock-small", "ttl probe");
    cache.put(&fp, response("cached"));

    assert!(cache.get(&fp, false).is_some(), "hit expected before ttl");
    std::thread::sleep(Duration::from_millis(80));
    assert!(cache.get(&fp, false).is_none(), "miss expected at/after ttl");
    // The expired entry is dropped from the table, not just hidden.
    assert!(!cache.contains(&fp));
}

#[test]
fn zero_ttl_means_no_expiry_until_evicted() {
    let cache = ResponseCache::new(CacheConfig {
        ttl: Duration::ZERO,
        ..CacheConfig::default()
    });
    let fp = Fingerprint::compute("mock-small", "immortal");
    cache.put(&fp, response("cached"));
    std::thread::sleep(Duration::from_millis(30));
    assert!(cache.get(&fp, false).is_some());
}

#[test]
fn bypass_forces_a_miss_on_a_matching_entry() {
    let cache = ResponseCache::new(CacheConfig::default());
    let fp = Fingerprint::compute("mock-small", "bypass probe");
    cache.put(&fp, response("cached"));

    assert!(cache.get(&fp, true).is_none());
    let stats = cache.stats();
    assert_eq!((stats.hits, stats.misses), (0, 1));
    // The entry itself is untouched.
    assert!(cache.get(&fp, false).is_some());
}

#[test]
fn lru_eviction_removes_exactly_the_least_recently_used() {
    let cache = ResponseCache::new(CacheConfig {
        max_entries: 2,
        ..CacheConfig::default()
    });
    let first = Fingerprint::compute("mock-small", "first");
    let second = Fingerprint::compute("mock-small", "second");
    let third = Fingerprint::compute("mock-small", "third");

    cache.put(&first, response("1"));
    cache.put(&second, response("2"));
    // Touch `first` so `second` becomes the least recently used.
    assert!(cache.get(&first, false).is_some());

    cache.put(&third, response("3"));
    assert_eq!(cache.len(), 2);
    assert!(cache.contains(&first));
    assert!(!cache.contains(&second));
    assert!(cache.contains(&third));
}

#[test]
fn stats_accumulate_and_reset_independently_of_entries() {
    let cache = ResponseCache::new(CacheConfig::default());
    let fp = Fingerprint::compute("mock-small", "stats probe");

    assert!(cache.get(&fp, false).is_none());
    cache.put(&fp, response("cached"));
    assert!(cache.get(&fp, false).is_some());
    assert!(cache.get(&fp, false).is_some());

    let stats = cache.stats();
    assert_eq!((stats.hits, stats.misses), (2, 1));
    assert_eq!(stats.tokens_saved, 240);
    assert!((stats.cost_saved - 0.16).abs() < 1e-9);

    cache.reset_stats();
    let reset = cache.stats();
    assert_eq!((reset.hits, reset.misses), (0, 0));
    assert_eq!(reset.tokens_saved, 0);
    // Stored entries survive the reset.
    assert_eq!(cache.len(), 1);
    assert!(cache.get(&fp, false).is_some());
}

#[test]
fn disabled_cache_misses_and_stores_nothing() {
    let cache = ResponseCache::new(CacheConfig {
        enabled: false,
        ..CacheConfig::default()
    });
    let fp = Fingerprint::compute("mock-small", "disabled probe");
    cache.put(&fp, response("cached"));
    assert!(cache.get(&fp, false).is_none());
    assert!(cache.is_empty());
}

#[test]
fn durable_mirror_rehydrates_across_instances() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = CacheConfig {
        dir: Some(dir.path().to_path_buf()),
        ..CacheConfig::default()
    };
    let fp = Fingerprint::compute("mock-small", "durable probe");

    {
        let cache = ResponseCache::new(config.clone());
        cache.put(&fp, response("persisted"));
    }

    let revived = ResponseCache::new(config);
    let hit = revived.get(&fp, false).expect("rehydrated entry");
    assert_eq!(hit.text, "persisted");
}

#[test]
fn durable_mirror_skips_expired_entries_on_rehydrate() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = CacheConfig {
        dir: Some(dir.path().to_path_buf()),
        ttl: Duration::from_millis(40),
        ..CacheConfig::default()
    };
    let fp = Fingerprint::compute("mock-small", "expiring durable probe");

    {
        let cache = ResponseCache::new(config.clone());
        cache.put(&fp, response("short-lived"));
    }
    std::thread::sleep(Duration::from_millis(60));

    let revived = ResponseCache::new(config);
    assert!(revived.is_empty());
    assert!(revived.get(&fp, false).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_lose_no_entries() {
    let cache = std::sync::Arc::new(ResponseCache::new(CacheConfig::default()));
    let mut handles = Vec::new();
    for i in 0..16 {
        let cache = std::sync::Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            let fp = Fingerprint::compute("mock-small", &format!("concurrent {i}"));
            cache.put(&fp, response(&format!("value {i}")));
        }));
    }
    for handle in handles {
        handle.await.expect("writer task");
    }
    assert_eq!(cache.len(), 16);
}
