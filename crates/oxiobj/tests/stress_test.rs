//! Stress tests for the oxiobj runtime.
//!
//! These tests validate runtime behavior under heavy concurrent load:
//! - Balanced retain/release/autorelease from many threads
//! - Concurrent weak loads against the final release
//! - Dispatch while methods are added and replaced
//! - Class registration from many threads
//!
//! Run with: `cargo test --test stress_test -- --nocapture`

mod common;

use common::{
    TEARDOWN_CALLS, create_class, create_class_with, return_1, return_2, selector,
    with_teardown,
};
use oxiobj::runtime::{
    Object, Weak, autoreleasepool, lookup_class, release, retain, retain_autorelease,
};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Instant;

const THREADS: usize = 8;
const OPS_PER_THREAD: usize = 10_000;

// ============================================================================
// Reference Counting
// ============================================================================

#[test]
fn test_balanced_retain_release_autorelease() {
    let class = create_class_with("StressRefcount", None, with_teardown);
    let object = Object::new(class).unwrap();
    let before = TEARDOWN_CALLS.load(Ordering::SeqCst);
    let barrier = Arc::new(Barrier::new(THREADS));
    let start = Instant::now();

    let handles: Vec<_> = (0..THREADS)
        .map(|thread_index| {
            let object = object.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for op in 0..OPS_PER_THREAD {
                    match (op + thread_index) % 3 {
                        0 => drop(object.clone()),
                        // SAFETY: `object` keeps the receiver alive.
                        1 => unsafe {
                            retain(object.id());
                            release(object.id());
                        },
                        _ => autoreleasepool(|| {
                            let _ = retain_autorelease(&object);
                        }),
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    println!(
        "{} balanced refcount ops in {:?}",
        THREADS * OPS_PER_THREAD,
        start.elapsed()
    );

    assert_eq!(object.retain_count(), 1);
    // Other tests in this binary do not use teardown hooks.
    assert_eq!(TEARDOWN_CALLS.load(Ordering::SeqCst), before);
    drop(object);
    assert_eq!(TEARDOWN_CALLS.load(Ordering::SeqCst), before + 1);
}

#[test]
fn test_many_short_lived_objects() {
    let class = create_class("StressShortLived", None);
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            thread::spawn(move || {
                for _ in 0..OPS_PER_THREAD / 10 {
                    autoreleasepool(|| {
                        let object = Object::new(class).unwrap();
                        let _ = retain_autorelease(&object);
                        let _ = object.autorelease();
                    });
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

// ============================================================================
// Weak References
// ============================================================================

#[test]
fn test_weak_load_races_final_release() {
    let class = create_class("StressWeak", None);

    for _ in 0..100 {
        let object = Object::new(class).unwrap();
        let weak = Arc::new(Weak::new(&object));
        let barrier = Arc::new(Barrier::new(THREADS + 1));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let weak = Arc::clone(&weak);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let mut loads = 0;
                    while let Some(strong) = weak.load() {
                        assert!(strong.retain_count() >= 1);
                        loads += 1;
                        if loads == 1_000 {
                            break;
                        }
                    }
                })
            })
            .collect();

        barrier.wait();
        drop(object);
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(weak.load().is_none());
    }
}

#[test]
fn test_weak_slots_created_and_dropped_concurrently() {
    let class = create_class("StressWeakChurn", None);
    let object = Object::new(class).unwrap();

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let object = object.clone();
            thread::spawn(move || {
                for _ in 0..1_000 {
                    let weak = Weak::new(&object);
                    assert_eq!(weak.load().as_ref(), Some(&object));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(oxiobj::runtime::weak_reference_count(&object), 0);
}

// ============================================================================
// Dispatch and Registration
// ============================================================================

#[test]
fn test_dispatch_while_subclass_gains_override() {
    let sel = selector("stressOverride");
    let base = create_class_with("StressDispatchBase", None, |class| {
        class.add_method(sel, return_1, "Q@:");
    });
    let derived = create_class("StressDispatchDerived", Some(base));
    let object = Object::new(derived).unwrap();
    let barrier = Arc::new(Barrier::new(THREADS + 1));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let object = object.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..OPS_PER_THREAD {
                    let value = object.send(sel, &[]);
                    assert!(value == 1 || value == 2);
                }
            })
        })
        .collect();

    barrier.wait();
    derived.add_method(sel, return_2, "Q@:");
    for handle in handles {
        handle.join().unwrap();
    }

    // Once the override is installed no thread may see the inherited one.
    assert_eq!(object.send(sel, &[]), 2);
}

#[test]
fn test_concurrent_class_registration() {
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            thread::spawn(|| {
                (0..50)
                    .map(|_| create_class("StressRegistered", None).name())
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let names: Vec<_> = handles
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .collect();

    assert_eq!(names.len(), THREADS * 50);
    for name in names {
        assert!(lookup_class(name).is_some(), "{name} missing");
    }
}
