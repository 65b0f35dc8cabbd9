//! Tests for BlobCache and Inflight

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use airtree::cache::{BlobCache, CacheSlot, Inflight};
use airtree::{AirError, Address};
use bytes::Bytes;

fn address(n: u8) -> Address {
    Address::from_content(&[n])
}

fn ready_bytes(slot: Option<CacheSlot>) -> Option<Bytes> {
    match slot {
        Some(CacheSlot::Ready(bytes)) => Some(bytes),
        _ => None,
    }
}

#[test]
fn test_get_counts_hits_and_misses() {
    let cache = BlobCache::new(16);
    assert!(cache.get(&address(1)).is_none());

    cache.insert(address(1), CacheSlot::Ready(Bytes::from_static(b"one")));
    assert_eq!(ready_bytes(cache.get(&address(1))).unwrap().as_ref(), b"one");

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.len, 1);
    assert!(stats.capacity >= 16);
}

#[test]
fn test_contains_does_not_touch_stats() {
    let cache = BlobCache::new(16);
    cache.insert(address(1), CacheSlot::Ready(Bytes::new()));

    assert!(cache.contains(&address(1)));
    assert!(!cache.contains(&address(2)));

    let stats = cache.stats();
    assert_eq!(stats.hits + stats.misses, 0);
}

#[test]
fn test_get_or_load_runs_loader_once() {
    let cache = BlobCache::new(16);
    let mut calls = 0;

    for _ in 0..3 {
        let slot = cache
            .get_or_load(address(7), || {
                calls += 1;
                Ok(Bytes::from_static(b"seven"))
            })
            .unwrap();
        assert!(matches!(slot, CacheSlot::Ready(ref b) if b.as_ref() == b"seven"));
    }

    assert_eq!(calls, 1);
    assert_eq!(cache.stats().loads, 1);
    assert!(cache.is_ready(&address(7)));
}

#[test]
fn test_failed_load_is_not_cached() {
    let cache = BlobCache::new(16);

    let result = cache.get_or_load(address(3), || {
        Err(AirError::NotFound {
            key: "gone".to_string(),
        })
    });
    assert!(matches!(result, Err(AirError::NotFound { .. })));
    assert!(!cache.contains(&address(3)));

    let slot = cache
        .get_or_load(address(3), || Ok(Bytes::from_static(b"back")))
        .unwrap();
    assert!(matches!(slot, CacheSlot::Ready(_)));
}

#[test]
fn test_pending_slot_is_not_ready() {
    let cache = BlobCache::new(16);
    cache.insert(address(1), CacheSlot::Pending(Arc::new(Inflight::new())));

    assert!(cache.contains(&address(1)));
    assert!(!cache.is_ready(&address(1)));
}

#[test]
fn test_invalidate_pending_matches_owner() {
    let cache = BlobCache::new(16);
    let owner = Arc::new(Inflight::new());
    let stranger = Arc::new(Inflight::new());
    cache.insert(address(1), CacheSlot::Pending(Arc::clone(&owner)));
    cache.insert(address(2), CacheSlot::Ready(Bytes::from_static(b"two")));

    cache.invalidate_pending(&address(1), &stranger);
    assert!(cache.contains(&address(1)));

    cache.invalidate_pending(&address(1), &owner);
    assert!(!cache.contains(&address(1)));

    // Ready slots are never touched
    cache.invalidate_pending(&address(2), &owner);
    assert!(cache.is_ready(&address(2)));

    cache.invalidate(&address(2));
    assert!(cache.is_empty());
}

#[test]
fn test_inflight_wakes_waiters_on_complete() {
    let inflight = Arc::new(Inflight::new());
    let waiters: Vec<_> = (0..4u8)
        .map(|n| {
            let inflight = Arc::clone(&inflight);
            thread::spawn(move || inflight.wait(&address(n)))
        })
        .collect();

    thread::sleep(Duration::from_millis(20));
    assert!(!inflight.is_done());

    let mut values = HashMap::new();
    values.insert(address(0), Bytes::from_static(b"zero"));
    values.insert(address(1), Bytes::from_static(b"one"));
    inflight.complete(values);
    assert!(inflight.is_done());

    let results: Vec<Option<Bytes>> = waiters.into_iter().map(|w| w.join().unwrap()).collect();
    assert_eq!(results[0].as_deref(), Some(&b"zero"[..]));
    assert_eq!(results[1].as_deref(), Some(&b"one"[..]));
    assert_eq!(results[2], None);
    assert_eq!(results[3], None);
}

#[test]
fn test_inflight_failure_releases_waiters() {
    let inflight = Arc::new(Inflight::new());
    let waiter = {
        let inflight = Arc::clone(&inflight);
        thread::spawn(move || inflight.wait(&address(0)))
    };

    thread::sleep(Duration::from_millis(20));
    inflight.fail();

    assert_eq!(waiter.join().unwrap(), None);
    assert_eq!(inflight.wait(&address(0)), None);
}

#[test]
fn test_insert_if_absent_keeps_existing_slot() {
    let cache = BlobCache::new(16);
    cache.insert(address(1), CacheSlot::Ready(Bytes::from_static(b"one")));
    let pending = Arc::new(Inflight::new());

    assert!(!cache.insert_if_absent(address(1), CacheSlot::Pending(Arc::clone(&pending))));
    assert!(cache.is_ready(&address(1)));

    assert!(cache.insert_if_absent(address(2), CacheSlot::Pending(Arc::clone(&pending))));
    assert!(cache.contains(&address(2)));
    assert!(!cache.insert_if_absent(address(2), CacheSlot::Ready(Bytes::new())));
    assert!(!cache.is_ready(&address(2)));
}

#[test]
fn test_insert_if_absent_does_not_wait_on_loader() {
    let cache = BlobCache::new(16);
    let (started_tx, started_rx) = std::sync::mpsc::channel();
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

    let shared = &cache;
    thread::scope(|scope| {
        let loader = scope.spawn(move || {
            shared.get_or_load(address(4), move || {
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                Ok(Bytes::from_static(b"loaded"))
            })
        });

        started_rx.recv().unwrap();
        let placeholder = CacheSlot::Pending(Arc::new(Inflight::new()));
        assert!(!cache.insert_if_absent(address(4), placeholder));

        release_tx.send(()).unwrap();
        assert!(loader.join().unwrap().is_ok());
    });

    assert!(cache.is_ready(&address(4)));
}
