//! Provider Scenario Tests
//!
//! End-to-end behavior of the provider facade over in-memory stores:
//! key listing, tip-name lookup, removal on read-only stores, versioned
//! reads, cache coherence and reload isolation.

use geodepot_core::{GeoError, NameKey, ProviderConfig, StoreError};
use geodepot_storage::{MemoryResource, MemoryStore, Provider, Store, View};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

// ============================================================================
// HELPERS
// ============================================================================

fn provider_over(build: impl Fn() -> MemoryStore + Send + Sync + 'static) -> Provider {
    let supplier = move |_: &ProviderConfig| -> Result<Box<dyn Store>, StoreError> { Ok(Box::new(build())) };
    Provider::new(ProviderConfig::new("scenario", "memory"), supplier).unwrap()
}

fn key_strings(provider: &Provider) -> Vec<String> {
    provider
        .keys()
        .unwrap()
        .iter()
        .map(NameKey::to_string)
        .collect()
}

fn get(provider: &Provider, name: &str) -> Option<Arc<View>> {
    provider.get(name, None).unwrap()
}

// ============================================================================
// SCENARIOS
// ============================================================================

#[test]
fn test_keys_in_discovery_order() {
    let provider = provider_over(|| MemoryStore::with_features("memory", ["a:b", "a:c"]));
    assert_eq!(key_strings(&provider), ["a:b", "a:c"]);
}

#[test]
fn test_tip_lookup_resolves_unique_candidate() {
    let provider = provider_over(|| MemoryStore::with_features("memory", ["a:b", "a:c"]));
    let view = get(&provider, "b").unwrap();
    assert_eq!(view.key().as_str(), "a:b");
}

#[test]
fn test_tip_lookup_refuses_ambiguous_candidates() {
    let provider = provider_over(|| MemoryStore::with_features("memory", ["a:b", "x:b"]));
    assert!(get(&provider, "b").is_none());
    // Fully qualified lookups still work.
    assert_eq!(get(&provider, "x/b").unwrap().key().as_str(), "x:b");
}

#[test]
fn test_remove_on_read_only_store() {
    let provider = provider_over(|| MemoryStore::with_features("memory", ["a:b", "a:c"]));
    assert!(!provider.remove("a:b").unwrap());
    assert_eq!(key_strings(&provider), ["a:b", "a:c"]);
}

#[test]
fn test_versioned_get_always_builds() {
    let provider = provider_over(|| MemoryStore::with_features("memory", ["a:b"]).versioned());
    let version = chrono::Utc::now();

    let current = provider.get("a:b", None).unwrap().unwrap();
    let versioned = provider.get("a:b", Some(version)).unwrap().unwrap();
    let again = provider.get("a:b", Some(version)).unwrap().unwrap();

    assert!(!Arc::ptr_eq(&current, &versioned));
    assert!(!Arc::ptr_eq(&versioned, &again));
    assert_eq!(versioned.header().version, Some(version));
    assert!(versioned.is_equivalent(&again));
    assert_eq!(provider.cache_stats().unwrap().bypasses, 2);
}

// ============================================================================
// CACHE COHERENCE
// ============================================================================

#[test]
fn test_repeated_get_returns_same_or_equivalent_view() {
    let provider = provider_over(|| MemoryStore::with_features("memory", ["a:b"]));
    let first = get(&provider, "a:b").unwrap();
    let second = get(&provider, "a:b").unwrap();
    assert!(Arc::ptr_eq(&first, &second) || first.is_equivalent(&second));
}

#[test]
fn test_reclaimed_view_is_rebuilt_equivalent() {
    let provider = provider_over(|| MemoryStore::with_features("memory", ["a:b"]));
    let first = get(&provider, "a:b").unwrap();
    let snapshot = View::clone(&first);
    let weak = Arc::downgrade(&first);
    drop(first);
    assert!(weak.upgrade().is_none());

    let rebuilt = get(&provider, "a:b").unwrap();
    assert!(rebuilt.is_equivalent(&snapshot));

    let stats = provider.cache_stats().unwrap();
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.live_views, 1);
}

#[test]
fn test_concurrent_readers_share_one_view() {
    let opens = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&opens);
    let provider = provider_over(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        MemoryStore::with_features("memory", ["a:b", "a:c"])
    });
    let held = get(&provider, "a:b").unwrap();

    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for _ in 0..50 {
                    let view = get(&provider, "a:b").unwrap();
                    assert!(Arc::ptr_eq(&view, &held));
                }
            });
        }
    });
    assert_eq!(opens.load(Ordering::SeqCst), 1);
}

#[test]
fn test_first_access_from_many_threads_opens_once() {
    let opens = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&opens);
    let provider = provider_over(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        MemoryStore::with_features("memory", ["a"])
    });

    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| assert_eq!(provider.keys().unwrap().len(), 1));
        }
    });
    assert_eq!(opens.load(Ordering::SeqCst), 1);
}

// ============================================================================
// RELOAD ISOLATION
// ============================================================================

#[test]
fn test_reload_picks_up_changed_store() {
    let names = Arc::new(Mutex::new(vec!["a:b".to_string(), "a:c".to_string()]));
    let shared = Arc::clone(&names);
    let provider = provider_over(move || {
        MemoryStore::with_features("memory", shared.lock().unwrap().clone())
    });

    assert_eq!(key_strings(&provider), ["a:b", "a:c"]);
    names.lock().unwrap().push("a:d".to_string());
    // Without a reload the open set is still the old one.
    assert_eq!(key_strings(&provider), ["a:b", "a:c"]);

    provider.reload().unwrap();
    assert_eq!(key_strings(&provider), ["a:b", "a:c", "a:d"]);
}

#[test]
fn test_views_from_before_reload_are_not_equivalent() {
    let closes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&closes);
    let provider = provider_over(move || {
        MemoryStore::with_features("memory", ["a:b"]).with_close_counter(Arc::clone(&counter))
    });

    let before = get(&provider, "a:b").unwrap();
    let old_generation = provider.generation().unwrap();
    provider.reload().unwrap();
    assert_eq!(closes.load(Ordering::SeqCst), 1);

    let after = get(&provider, "a:b").unwrap();
    assert_eq!(before.header().generation, old_generation);
    assert_ne!(after.header().generation, old_generation);
    assert!(!before.is_equivalent(&after));
}

#[test]
fn test_reload_while_reading() {
    let opens = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&opens);
    let provider = provider_over(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        MemoryStore::with_features("memory", ["a:b", "a:c"])
    });

    thread::scope(|s| {
        for _ in 0..6 {
            s.spawn(|| {
                for _ in 0..100 {
                    assert_eq!(provider.keys().unwrap().len(), 2);
                    let view = get(&provider, "c").unwrap();
                    assert_eq!(view.key().as_str(), "a:c");
                }
            });
        }
        s.spawn(|| {
            for _ in 0..20 {
                provider.reload().unwrap();
                thread::yield_now();
            }
        });
    });

    assert!(opens.load(Ordering::SeqCst) >= 1);
    assert_eq!(provider.guard().snapshot().readers, 0);
}

#[test]
fn test_dispose_then_reuse() {
    let provider = provider_over(|| MemoryStore::with_features("memory", ["a"]));
    provider.keys().unwrap();
    provider.dispose();
    assert!(!provider.is_materialized());
    assert_eq!(key_strings(&provider), ["a"]);
}

#[test]
fn test_enumeration_failure_is_store_error() {
    let provider = provider_over(|| MemoryStore::new("memory").failing_enumeration());
    let err = provider.keys().unwrap_err();
    assert!(matches!(err, GeoError::Store(StoreError::Enumerate { .. })));
    assert!(!err.is_retryable());
    assert!(provider.get("a", None).is_err());
}

#[test]
fn test_unnamed_datasets_are_unreachable() {
    let provider = provider_over(|| {
        let store = MemoryStore::with_features("memory", ["a"]);
        store.add(MemoryResource::unnamed());
        store
    });
    assert_eq!(key_strings(&provider), ["a"]);
}
