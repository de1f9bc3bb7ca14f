#![allow(clippy::unwrap_used, missing_docs)]

use std::sync::Arc;

use fs_proxy::cache::PathCache;

#[test]
fn concurrent_gets_of_one_path_share_an_entry() {
    let cache = PathCache::new(100);

    let entries = std::thread::scope(|s| {
        let handles: Vec<_> = (0..16)
            .map(|_| s.spawn(|| cache.get("/shared/path")))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect::<Vec<_>>()
    });

    assert_eq!(cache.len(), 1, "only one entry should ever be created");
    for entry in &entries[1..] {
        assert!(Arc::ptr_eq(&entries[0], entry));
    }
}

#[test]
fn concurrent_distinct_gets_respect_capacity() {
    let cache = PathCache::new(50);

    std::thread::scope(|s| {
        for t in 0..8 {
            let cache = &cache;
            s.spawn(move || {
                for i in 0..100 {
                    let entry = cache.get(&format!("/t{t}/p{i}"));
                    assert_eq!(entry.as_path().to_str().unwrap(), format!("/t{t}/p{i}"));
                }
            });
        }
    });

    assert_eq!(cache.len(), 50);
}
