use super::*;

#[test]
fn allocations_bump_within_one_generation() {
    let mut ring = RingCache::new(100);
    let a = ring.reserve(40).unwrap();
    let b = ring.reserve(60).unwrap();
    assert_eq!(a, CacheRange { offset: 0, generation: 1 });
    assert_eq!(b, CacheRange { offset: 40, generation: 1 });
    assert!(ring.is_valid(a));
    assert!(ring.is_valid(b));
}

#[test]
fn overflow_wraps_and_invalidates_previous_ranges() {
    let mut ring = RingCache::new(64);
    let first = ring.reserve(40).unwrap();
    let second = ring.reserve(25).unwrap();

    assert_ne!(first.generation, second.generation);
    assert_eq!(second.generation % 2, 1);
    assert_eq!(second.offset, 0);
    assert!(!ring.is_valid(first));
    assert!(ring.is_valid(second));
}

#[test]
fn oversized_requests_fail_without_disturbing_the_ring() {
    let mut ring = RingCache::new(16);
    let kept = ring.reserve(8).unwrap();
    assert!(ring.reserve(17).is_none());
    assert!(ring.is_valid(kept));
    assert_eq!(ring.position(), 8);
}

#[test]
fn zeroed_ranges_are_never_valid() {
    let mut ring = RingCache::new(8);
    assert!(!ring.is_valid(CacheRange::default()));
    for _ in 0..100 {
        ring.reserve(5).unwrap();
        assert_eq!(ring.generation() % 2, 1);
        assert!(!ring.is_valid(CacheRange::default()));
    }
}

#[test]
fn invalidate_starts_a_new_generation() {
    let mut ring = RingCache::new(8);
    let r = ring.reserve(4).unwrap();
    ring.invalidate();
    assert!(!ring.is_valid(r));
    assert_eq!(ring.position(), 0);
    assert_eq!(ring.generation(), 3);
}
