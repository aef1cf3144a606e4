//! Autorelease pools.
//!
//! An autoreleased reference is released later, when the innermost pool
//! that was open at the time is popped. Pools are strictly nested and
//! thread-local: each thread keeps one vector of pending references and a
//! stack of marks into it.
//!
//! # Popping
//!
//! [`pop_pool`] releases everything recorded since the matching
//! [`push_pool`], in the order it was recorded, including pools pushed
//! inside it that were never popped. Releasing can run teardown hooks that
//! autorelease more objects; those land in the pool being popped and are
//! drained in the same call.
//!
//! # Without a pool
//!
//! Autoreleasing with no pool open logs a warning and opens an implicit
//! pool that lasts until the thread exits. Whatever is still pending when
//! a thread exits is released by the thread-local destructor.

use crate::error::Error;
use crate::runtime::fatal::fatal;
use crate::runtime::object::{Id, release};
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

// ============================================================================
// Thread-local pool stack
// ============================================================================

// Global so that a handle from one thread never matches a pool on another.
static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

struct Mark {
    start: usize,
    serial: u64,
}

struct PoolStack {
    objects: Vec<Id>,
    marks: Vec<Mark>,
}

impl PoolStack {
    const fn new() -> Self {
        PoolStack {
            objects: Vec::new(),
            marks: Vec::new(),
        }
    }

    fn push(&mut self) -> (u64, usize) {
        let serial = NEXT_SERIAL.fetch_add(1, Ordering::Relaxed);
        self.marks.push(Mark {
            start: self.objects.len(),
            serial,
        });
        (serial, self.marks.len() - 1)
    }
}

impl Drop for PoolStack {
    fn drop(&mut self) {
        if self.objects.is_empty() {
            return;
        }

        oxiobj_log::warn!(
            "releasing {} autoreleased objects left at thread exit",
            self.objects.len()
        );
        for id in std::mem::take(&mut self.objects) {
            // SAFETY: each entry owns the reference handed to `autorelease`.
            unsafe { release(id) };
        }
    }
}

thread_local! {
    static POOLS: RefCell<PoolStack> = const { RefCell::new(PoolStack::new()) };
}

// ============================================================================
// Public API
// ============================================================================

/// Identifies one pushed pool on one thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolHandle {
    serial: u64,
    depth: usize,
    thread: ThreadId,
}

/// Opens a new innermost pool on the current thread.
#[must_use = "the pool stays open until its handle is popped"]
pub fn push_pool() -> PoolHandle {
    let (serial, depth) = POOLS.with(|pools| pools.borrow_mut().push());
    PoolHandle {
        serial,
        depth,
        thread: thread::current().id(),
    }
}

/// Releases every reference recorded since `handle` was pushed and closes
/// that pool along with any pools opened inside it.
///
/// A handle from another thread, or one whose pool was already popped, is
/// fatal.
pub fn pop_pool(handle: PoolHandle) {
    if handle.thread != thread::current().id() {
        fatal(Error::InvalidPool {
            reason: "pool belongs to another thread",
        });
    }

    POOLS.with(|pools| {
        let start = {
            let mut stack = pools.borrow_mut();
            let start = stack
                .marks
                .get(handle.depth)
                .filter(|mark| mark.serial == handle.serial)
                .map(|mark| mark.start);
            let Some(start) = start else {
                fatal(Error::InvalidPool {
                    reason: "pool was already popped",
                });
            };
            // Inner pools close with this one.
            stack.marks.truncate(handle.depth + 1);
            start
        };

        // No borrow is held while releasing: teardown hooks may autorelease.
        loop {
            let drained = {
                let mut stack = pools.borrow_mut();
                if stack.objects.len() <= start {
                    break;
                }
                stack.objects.split_off(start)
            };
            for id in drained {
                // SAFETY: each entry owns the reference handed to `autorelease`.
                unsafe { release(id) };
            }
        }

        pools.borrow_mut().marks.truncate(handle.depth);
    });
}

/// Records `id` in the current thread's innermost pool and returns it.
///
/// Classes and tagged pointers are returned without being recorded.
///
/// # Safety
///
/// The caller must own one reference to `id`; the pool takes it over.
pub unsafe fn autorelease(id: Id) -> Id {
    if id.as_object_ptr().is_none() {
        return id;
    }

    let recorded = POOLS.try_with(|pools| {
        let mut stack = pools.borrow_mut();
        if stack.marks.is_empty() {
            oxiobj_log::warn!(
                "autorelease with no pool in place on {:?}; opening an implicit pool",
                thread::current().id()
            );
            stack.push();
        }
        stack.objects.push(id);
    });

    if recorded.is_err() {
        oxiobj_log::warn!("autorelease during thread exit; releasing immediately");
        // SAFETY: the caller's reference is not recorded anywhere.
        unsafe { release(id) };
    }
    id
}

/// Number of pools open on the current thread.
#[must_use]
pub fn pool_depth() -> usize {
    POOLS.with(|pools| pools.borrow().marks.len())
}

/// Number of references waiting in the current thread's pools.
#[must_use]
pub fn pending_autoreleases() -> usize {
    POOLS.with(|pools| pools.borrow().objects.len())
}

/// Scoped autorelease pool: pushed on creation, popped on drop.
pub struct AutoreleasePool {
    handle: PoolHandle,
    // Pools belong to the thread that pushed them.
    _not_send: PhantomData<*const ()>,
}

impl AutoreleasePool {
    /// Opens a pool that closes when the guard is dropped.
    #[must_use = "dropping the guard pops the pool immediately"]
    pub fn new() -> Self {
        AutoreleasePool {
            handle: push_pool(),
            _not_send: PhantomData,
        }
    }

    /// Handle of the underlying pool.
    #[must_use]
    pub fn handle(&self) -> PoolHandle {
        self.handle
    }
}

impl Default for AutoreleasePool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AutoreleasePool {
    fn drop(&mut self) {
        pop_pool(self.handle);
    }
}

/// Runs `f` inside a fresh autorelease pool.
pub fn autoreleasepool<R>(f: impl FnOnce() -> R) -> R {
    let _pool = AutoreleasePool::new();
    f()
}
