use logtriage_cache::ResponseCache;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn hit_after_put_with_reordered_arguments() {
    let cache = ResponseCache::with_limits(Duration::from_secs(60), 10);
    let stored = json!({"error_count": 2, "failing_stages": ["Test"]});
    cache.put(
        "summarize_log",
        &json!({"job": "app", "build": 4, "tail_lines": 20}),
        stored.clone(),
    );

    let hit = cache.get(
        "summarize_log",
        &json!({"tail_lines": 20, "build": 4, "job": "app"}),
    );
    assert_eq!(hit, Some(stored));
    assert_eq!(cache.get("summarize_log", &json!({"job": "app", "build": 5})), None);

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hit_rate(), 0.5);
}

#[test]
fn entries_expire_after_ttl() {
    let cache = ResponseCache::with_limits(Duration::from_millis(20), 10);
    let args = json!({"job": "app", "build": 1});
    cache.put("analyze_log", &args, json!({"findings": []}));
    assert!(cache.get("analyze_log", &args).is_some());

    std::thread::sleep(Duration::from_millis(40));
    assert!(cache.get("analyze_log", &args).is_none());

    let stats = cache.stats();
    assert_eq!(stats.expirations, 1);
    assert_eq!(stats.entries, 0);
}

#[test]
fn least_recently_used_entry_is_evicted() {
    let cache = ResponseCache::with_limits(Duration::from_secs(60), 2);
    for build in 1..=2 {
        cache.put("triage_failure", &json!({"build": build}), json!(build));
    }
    // Touch build 1 so build 2 becomes the eviction candidate.
    assert!(cache.get("triage_failure", &json!({"build": 1})).is_some());
    cache.put("triage_failure", &json!({"build": 3}), json!(3));

    assert!(cache.get("triage_failure", &json!({"build": 2})).is_none());
    assert_eq!(cache.get("triage_failure", &json!({"build": 1})), Some(json!(1)));
    assert_eq!(cache.stats().evictions, 1);
}

#[test]
fn last_writer_wins() {
    let cache = ResponseCache::with_limits(Duration::from_secs(60), 4);
    let args = json!({"build": 9});
    cache.put("summarize_log", &args, json!("first"));
    cache.put("summarize_log", &args, json!("second"));
    assert_eq!(cache.get("summarize_log", &args), Some(json!("second")));
    assert_eq!(cache.stats().evictions, 0);
    assert_eq!(cache.stats().entries, 1);
}

#[test]
fn shared_across_threads() {
    let cache = Arc::new(ResponseCache::with_limits(Duration::from_secs(60), 64));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let cache = cache.clone();
            std::thread::spawn(move || {
                cache.put("search_log", &json!({"build": i}), json!(i));
                cache.get("search_log", &json!({"build": i}))
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap().is_some());
    }
    assert_eq!(cache.stats().entries, 8);
}

#[test]
fn clear_empties_cache() {
    let cache = ResponseCache::with_limits(Duration::from_secs(60), 4);
    cache.put("fetch_log", &json!({"build": 1}), json!("x"));
    cache.clear();
    assert_eq!(cache.stats().entries, 0);
    assert!(cache.get("fetch_log", &json!({"build": 1})).is_none());
}
