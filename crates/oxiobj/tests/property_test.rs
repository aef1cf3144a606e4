//! Property tests for oxiobj runtime components.
//!
//! Deterministic pseudo-random operation sequences are checked against a
//! simple model, without pulling in a property-testing framework.
//!
//! Run with: `cargo test --test property_test`

mod common;

use common::{create_class, create_class_with, return_1, return_2, selector};
use oxiobj::runtime::{
    Hashtable, Object, Selector, TaggedPointer, Weak, autoreleasepool, pop_pool, push_pool,
    retain_autorelease,
};
use oxiobj::runtime::tagged::PAYLOAD_BITS;
use std::collections::HashMap;

// xorshift64*, seeded per test so failures reproduce.
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 >> 12;
        self.0 ^= self.0 << 25;
        self.0 ^= self.0 >> 27;
        self.0.wrapping_mul(0x2545_f491_4f6c_dd1d)
    }

    fn below(&mut self, bound: u64) -> u64 {
        self.next() % bound
    }
}

// ============================================================================
// Hashtable Properties
// ============================================================================

#[test]
fn test_hashtable_matches_model() {
    let mut rng = Rng(0x9e37_79b9_7f4a_7c15);
    let mut table: Hashtable<u64, u64> =
        Hashtable::new(|key: &u64| fxhash::hash32(key), |a, b| a == b).unwrap();
    let mut model = HashMap::new();

    for _ in 0..20_000 {
        let key = rng.below(512);
        match rng.below(3) {
            0 | 1 => {
                let value = rng.next();
                assert_eq!(table.set(key, value), model.insert(key, value));
            }
            _ => assert_eq!(table.delete(&key), model.remove(&key)),
        }
        assert_eq!(table.len(), model.len());
    }

    for (key, value) in &model {
        assert_eq!(table.get(key), Some(value));
    }
    assert_eq!(table.iter().count(), model.len());
}

// ============================================================================
// Reference Counting Properties
// ============================================================================

#[test]
fn test_random_retain_release_sequences_balance() {
    let mut rng = Rng(0x1234_5678_9abc_def1);
    let class = create_class("PropRefcount", None);
    let object = Object::new(class).unwrap();

    for _ in 0..200 {
        let mut held = Vec::new();
        let handle = push_pool();
        let mut autoreleased = 0;

        for _ in 0..rng.below(64) {
            match rng.below(3) {
                0 => held.push(object.clone()),
                1 => {
                    held.pop();
                }
                _ => {
                    let _ = retain_autorelease(&object);
                    autoreleased += 1;
                }
            }
            assert_eq!(object.retain_count(), 1 + held.len() + autoreleased);
        }

        pop_pool(handle);
        assert_eq!(object.retain_count(), 1 + held.len());
    }
}

#[test]
fn test_weak_tracks_liveness() {
    let mut rng = Rng(0xdead_beef_cafe_f00d);
    let class = create_class("PropWeak", None);

    for _ in 0..100 {
        let object = Object::new(class).unwrap();
        let weaks: Vec<_> = (0..rng.below(8) + 1).map(|_| Weak::new(&object)).collect();
        let strong: Vec<_> = (0..rng.below(4)).map(|_| object.clone()).collect();

        for weak in &weaks {
            assert_eq!(weak.load().as_ref(), Some(&object));
        }

        drop(object);
        let alive = !strong.is_empty();
        for weak in &weaks {
            assert_eq!(weak.load().is_some(), alive);
        }

        drop(strong);
        assert!(weaks.iter().all(Weak::is_nil));
    }
}

// ============================================================================
// Dispatch Properties
// ============================================================================

#[test]
fn test_latest_replacement_always_wins() {
    let mut rng = Rng(0x0bad_c0de_0bad_c0de);
    let sel = selector("propReplace");
    let class = create_class_with("PropReplace", None, |class| {
        class.add_method(sel, return_1, "Q@:");
    });
    let object = Object::new(class).unwrap();

    for _ in 0..1_000 {
        let (imp, expected) = if rng.below(2) == 0 {
            (return_1 as oxiobj::Imp, 1)
        } else {
            (return_2 as oxiobj::Imp, 2)
        };
        class.replace_method(sel, imp, "Q@:");
        assert_eq!(object.send(sel, &[]), expected);
    }
}

#[test]
fn test_selectors_are_interned() {
    let mut rng = Rng(0x5eed_5eed_5eed_5eed);
    for _ in 0..1_000 {
        let name = format!("propSelector{}:", rng.below(100));
        let a = Selector::register(&name).unwrap();
        let b: Selector = name.parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.name(), name);
        assert_eq!(Selector::lookup(&name), Some(a));
    }
    assert!(Selector::register("").is_err());
}

// ============================================================================
// Tagged Pointer Properties
// ============================================================================

#[test]
fn test_tagged_payload_round_trip() {
    let mut rng = Rng(0x7a66_ed00_7a66_ed00);
    let mask = (1usize << PAYLOAD_BITS) - 1;
    for _ in 0..10_000 {
        let index = rng.below(8) as u8;
        let payload = rng.next() as usize;
        let tagged = TaggedPointer::new(index, payload).unwrap();
        assert_eq!(tagged.index(), index);
        assert_eq!(tagged.value(), payload & mask);
        assert_eq!(TaggedPointer::from_word(tagged.word()), Some(tagged));
    }
}

#[test]
fn test_nested_pool_closures_restore_depth() {
    let mut rng = Rng(0x0dd5_0dd5_0dd5_0dd5);
    let class = create_class("PropPools", None);
    let object = Object::new(class).unwrap();

    fn nest(rng: &mut Rng, object: &Object, depth: u64) {
        autoreleasepool(|| {
            for _ in 0..rng.below(4) {
                let _ = retain_autorelease(object);
            }
            if depth > 0 && rng.below(2) == 0 {
                nest(rng, object, depth - 1);
            }
        });
    }

    for _ in 0..100 {
        nest(&mut rng, &object, 8);
        assert_eq!(object.retain_count(), 1);
    }
}
