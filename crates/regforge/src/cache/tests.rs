//! Tests for cache ref-counting, LRU eviction and error handling.

use super::PatternCache;
use regforge_core::Error;

#[test]
fn test_hit_returns_same_artifact() {
    let cache = PatternCache::new();
    let first = cache.acquire(b"ab+").unwrap();
    let second = cache.acquire(b"ab+").unwrap();
    assert_eq!(first.address(), second.address());
    assert_eq!(cache.size(), 1);
    cache.release(b"ab+");
    cache.release(b"ab+");
}

#[test]
fn test_acquire_release_pairs_keep_size_stable() {
    let cache = PatternCache::new();
    cache.acquire(b"abc").unwrap();
    cache.release(b"abc");
    let size_after_first_pair = cache.size();
    cache.acquire(b"abc").unwrap();
    cache.release(b"abc");
    assert_eq!(cache.size(), size_after_first_pair);
}

#[test]
fn test_eviction_drops_oldest_unpinned() {
    let cache = PatternCache::with_capacity(2);
    for pattern in [b"a".as_slice(), b"b".as_slice(), b"c".as_slice()] {
        cache.acquire(pattern).unwrap();
        cache.release(pattern);
    }
    assert_eq!(cache.size(), 2);
    // "a" was evicted: re-acquiring recompiles into a fresh entry and
    // evicts "b", while "c" stays resident
    let c_before = cache.acquire(b"c").unwrap().address();
    cache.release(b"c");
    cache.acquire(b"a").unwrap();
    cache.release(b"a");
    assert_eq!(cache.size(), 2);
    let c_after = cache.acquire(b"c").unwrap().address();
    cache.release(b"c");
    assert_eq!(c_before, c_after);
}

#[test]
fn test_hit_promotes_entry() {
    let cache = PatternCache::with_capacity(2);
    cache.acquire(b"a").unwrap();
    cache.release(b"a");
    cache.acquire(b"b").unwrap();
    cache.release(b"b");
    // touch "a" so "b" becomes the LRU tail
    let a_before = cache.acquire(b"a").unwrap().address();
    cache.release(b"a");
    cache.acquire(b"c").unwrap();
    cache.release(b"c");
    let a_after = cache.acquire(b"a").unwrap().address();
    cache.release(b"a");
    assert_eq!(a_before, a_after);
}

#[test]
fn test_pinned_entries_are_not_evicted() {
    let cache = PatternCache::with_capacity(1);
    let held = cache.acquire(b"held").unwrap();
    cache.acquire(b"other").unwrap();
    // both entries are pinned, so the cache stays over capacity
    assert_eq!(cache.size(), 2);
    // "held" is the pinned LRU tail: releasing "other" evicts nothing
    cache.release(b"other");
    assert_eq!(cache.size(), 2);
    let again = cache.acquire(b"held").unwrap();
    assert_eq!(held.address(), again.address());
    cache.release(b"held");
    cache.release(b"held");
    // with "held" promoted and unpinned, "other" is the evictable tail
    assert_eq!(cache.size(), 1);
}

#[test]
fn test_pinned_tail_blocks_eviction_pass() {
    let cache = PatternCache::with_capacity(1);
    cache.acquire(b"keep").unwrap();
    for pattern in [b"x".as_slice(), b"y".as_slice()] {
        cache.acquire(pattern).unwrap();
        cache.release(pattern);
    }
    // "keep" sits pinned at the LRU tail and shields the newer
    // unpinned entries behind it
    assert_eq!(cache.size(), 3);
    let y_before = cache.acquire(b"y").unwrap().address();
    cache.release(b"y");
    assert_eq!(cache.size(), 3);
    // unpinning the tail lets the next pass evict down to capacity,
    // oldest entries first
    cache.release(b"keep");
    assert_eq!(cache.size(), 1);
    let y_after = cache.acquire(b"y").unwrap().address();
    cache.release(b"y");
    assert_eq!(y_before, y_after);
    assert_eq!(cache.size(), 1);
}

#[test]
fn test_set_max_size_triggers_eviction() {
    let cache = PatternCache::with_capacity(8);
    for pattern in [&b"p0"[..], b"p1", b"p2", b"p3"] {
        cache.acquire(pattern).unwrap();
        cache.release(pattern);
    }
    assert_eq!(cache.size(), 4);
    cache.set_max_size(2);
    assert_eq!(cache.size(), 2);
}

#[test]
fn test_compile_error_leaves_cache_unchanged() {
    let cache = PatternCache::new();
    assert!(matches!(
        cache.acquire(b"a**"),
        Err(Error::MultipleRepeat(_))
    ));
    assert_eq!(cache.size(), 0);
    // unrelated compiles are not poisoned
    cache.acquire(b"ok").unwrap();
    cache.release(b"ok");
    assert_eq!(cache.size(), 1);
    // the failing pattern still fails the same way
    assert!(cache.acquire(b"a**").is_err());
}

#[test]
fn test_cache_from_config() {
    let config = regforge_config::EngineConfig {
        cache_max_size: 1,
        opt_level: regforge_config::OptLevelConfig::None,
        dump_ir_on_error: false,
    };
    let cache = PatternCache::with_config(&config);
    cache.acquire(b"x").unwrap();
    cache.release(b"x");
    cache.acquire(b"y").unwrap();
    cache.release(b"y");
    assert_eq!(cache.size(), 1);
}

#[test]
fn test_release_of_unknown_pattern_is_noop() {
    let cache = PatternCache::new();
    cache.release(b"never seen");
    assert_eq!(cache.size(), 0);
}

#[test]
fn test_find_with_and_without_terminator() {
    let cache = PatternCache::new();
    let span = cache.find(b"bc", b"abcd").unwrap().map(|m| m.span());
    assert_eq!(span, Some((1, 3)));
    let span = cache.find(b"bc", b"abcd\0").unwrap().map(|m| m.span());
    assert_eq!(span, Some((1, 3)));
    assert_eq!(cache.size(), 1);
}

#[test]
fn test_search_matches_find() {
    let cache = PatternCache::new();
    assert_eq!(
        cache.search(b"\\d+", b"ab123").unwrap().map(|m| m.span()),
        cache.find(b"\\d+", b"ab123").unwrap().map(|m| m.span()),
    );
}

#[test]
fn test_artifact_usable_after_eviction() {
    // an Arc held by the caller keeps the code alive past eviction
    let cache = PatternCache::with_capacity(1);
    let survivor = cache.acquire(b"xy+").unwrap();
    cache.release(b"xy+");
    cache.acquire(b"other").unwrap();
    cache.release(b"other");
    assert_eq!(cache.size(), 1);
    let mut input = b"zzxyyy".to_vec();
    input.push(0);
    let input = std::ffi::CStr::from_bytes_until_nul(&input).unwrap();
    assert_eq!(survivor.invoke(input).map(|m| m.span()), Some((2, 6)));
}
