//! Integration tests for object monitors and property accessors.
//!
//! Run with: `cargo test --test sync_test -- --nocapture`

mod common;

use common::{create_class, selector, unique_name};
use oxiobj::Error;
use oxiobj::runtime::{
    Class, Id, Ivar, Object, PropertyCopy, Selector, allocate_class_pair, autoreleasepool,
    get_ivar, get_property, register_class_pair, set_property, sync_enter, sync_exit,
    synchronized,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Instant;

const THREADS: usize = 8;
const OPS_PER_THREAD: usize = 2_000;
const MAGIC: u64 = 0x0bad_cafe;

// ============================================================================
// Monitors
// ============================================================================

#[test]
fn test_nested_enter_exit() {
    let object = Object::new(create_class("SyncNested", None)).unwrap();
    let id = Some(object.id());

    for _ in 0..3 {
        sync_enter(id).unwrap();
    }
    for _ in 0..3 {
        sync_exit(id).unwrap();
    }
    assert_eq!(sync_exit(id), Err(Error::SyncNotOwned));
}

#[test]
fn test_exit_without_enter_is_an_error() {
    let object = Object::new(create_class("SyncUnheld", None)).unwrap();
    assert_eq!(sync_exit(Some(object.id())), Err(Error::SyncNotOwned));
}

#[test]
fn test_exit_from_other_thread_is_an_error() {
    let object = Object::new(create_class("SyncForeignExit", None)).unwrap();
    sync_enter(Some(object.id())).unwrap();

    let id = object.id();
    let result = thread::scope(|scope| scope.spawn(move || sync_exit(Some(id))).join());
    assert_eq!(result.unwrap(), Err(Error::SyncNotOwned));

    sync_exit(Some(object.id())).unwrap();
}

#[test]
fn test_monitor_serializes_threads() {
    let object = Object::new(create_class("SyncContended", None)).unwrap();
    let counter = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(THREADS));
    let start = Instant::now();

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let object = object.clone();
            let counter = Arc::clone(&counter);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..OPS_PER_THREAD {
                    synchronized(&object, || {
                        // Split load and store lose updates unless serialized.
                        let value = counter.load(Ordering::Relaxed);
                        thread::yield_now();
                        counter.store(value + 1, Ordering::Relaxed);
                    });
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    println!(
        "{} monitor sections in {:?}",
        THREADS * OPS_PER_THREAD,
        start.elapsed()
    );
    assert_eq!(counter.load(Ordering::Relaxed), THREADS * OPS_PER_THREAD);
}

#[test]
fn test_synchronized_releases_on_panic() {
    let object = Object::new(create_class("SyncPanic", None)).unwrap();

    let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        synchronized(&object, || panic!("inside monitor"));
    }));
    assert!(caught.is_err());

    let id = object.id();
    let entered = thread::scope(|scope| {
        scope
            .spawn(move || {
                sync_enter(Some(id)).unwrap();
                sync_exit(Some(id)).unwrap();
                true
            })
            .join()
    });
    assert!(entered.unwrap());
}

// ============================================================================
// Properties
// ============================================================================

static VALUES_CREATED: AtomicUsize = AtomicUsize::new(0);
static VALUES_FREED: AtomicUsize = AtomicUsize::new(0);

fn value_freed(_: Id, _: Selector, _: &[usize]) -> usize {
    VALUES_FREED.fetch_add(1, Ordering::SeqCst);
    0
}

fn value_class() -> (Class, Ivar) {
    let class = allocate_class_pair(None, &unique_name("SyncValue"), 0).unwrap();
    let magic = class.add_ivar("magic", 8, 8, "Q").unwrap();
    class.add_method(selector("destroyIvars"), value_freed, "v@:");
    register_class_pair(class);
    (class, magic)
}

fn new_value(class: Class, magic: &Ivar) -> Object {
    let value = Object::new(class).unwrap();
    // SAFETY: the value is not shared yet.
    unsafe { value.set_ivar::<u64>(magic, MAGIC) };
    VALUES_CREATED.fetch_add(1, Ordering::SeqCst);
    value
}

#[test]
fn test_atomic_property_races_with_release() {
    let holder_class = allocate_class_pair(None, &unique_name("SyncHolder"), 0).unwrap();
    let slot = holder_class.add_ivar("value", 8, 8, "@").unwrap();
    register_class_pair(holder_class);
    let holder = Object::new(holder_class).unwrap();
    let (class, magic) = value_class();

    set_property(&holder, &slot, Some(&new_value(class, &magic)), true, PropertyCopy::Retain);

    let stop = Arc::new(AtomicBool::new(false));
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|thread_index| {
            let holder = holder.clone();
            let stop = Arc::clone(&stop);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                if thread_index % 2 == 0 {
                    for _ in 0..OPS_PER_THREAD {
                        let value = new_value(class, &magic);
                        set_property(&holder, &slot, Some(&value), true, PropertyCopy::Retain);
                    }
                    return 0;
                }

                let mut reads = 0;
                while !stop.load(Ordering::Relaxed) && reads < OPS_PER_THREAD * 4 {
                    autoreleasepool(|| {
                        let id = get_property(&holder, &slot, true).unwrap();
                        // SAFETY: the pool keeps the value alive.
                        let read = unsafe { get_ivar::<u64>(id, &magic) };
                        assert_eq!(read, MAGIC);
                    });
                    reads += 1;
                }
                reads
            })
        })
        .collect();

    let mut reads = 0;
    for (index, handle) in handles.into_iter().enumerate() {
        if index % 2 == 0 {
            handle.join().unwrap();
            stop.store(true, Ordering::Relaxed);
        } else {
            reads += handle.join().unwrap();
        }
    }
    assert!(reads > 0);

    set_property(&holder, &slot, None, true, PropertyCopy::Retain);
    assert_eq!(
        VALUES_FREED.load(Ordering::SeqCst),
        VALUES_CREATED.load(Ordering::SeqCst)
    );
}
