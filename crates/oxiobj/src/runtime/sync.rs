//! Per-object monitors and atomic property accessors.
//!
//! # Monitors
//!
//! [`sync_enter`] and [`sync_exit`] give every receiver a recursive lock,
//! created on first use and dropped once no thread holds or waits for it.
//! Monitors are kept in [`STRIPE_COUNT`] independently locked tables keyed
//! by the receiver word, the same way weak references are.
//!
//! # Properties
//!
//! A property is an object-typed instance variable holding one strong
//! reference. [`get_property`] and [`set_property`] read and replace it;
//! the atomic forms serialize on one of a fixed set of spinlocks chosen by
//! the ivar's address, so a getter never returns a value a concurrent
//! setter has already released.

use crate::error::{Error, Result};
use crate::runtime::class::Ivar;
use crate::runtime::fatal::{fatal, unwrap_or_fatal};
use crate::runtime::hashtable::{Hashtable, hash_ptr};
use crate::runtime::object::{Id, Object, ivar_ptr, release, retain};
use crate::runtime::pool;
use crate::runtime::selector::Selector;
use std::hint;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, ThreadId};

/// Number of independently locked monitor-table stripes.
pub const STRIPE_COUNT: usize = 16;

/// Number of spinlocks shared by atomic property accessors.
pub const PROPERTY_LOCK_COUNT: usize = 16;

const SPINS_BEFORE_YIELD: u32 = 64;

#[derive(Default)]
struct Ownership {
    thread: Option<ThreadId>,
    depth: usize,
}

#[derive(Default)]
struct Monitor {
    owner: Mutex<Ownership>,
    released: Condvar,
}

impl Monitor {
    fn owner(&self) -> MutexGuard<'_, Ownership> {
        self.owner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct MonitorEntry {
    monitor: Arc<Monitor>,
    // Threads holding or waiting for the monitor.
    users: usize,
}

type Stripe = Hashtable<usize, MonitorEntry>;

static STRIPES: OnceLock<[Mutex<Stripe>; STRIPE_COUNT]> = OnceLock::new();

fn stripes() -> &'static [Mutex<Stripe>; STRIPE_COUNT] {
    STRIPES.get_or_init(|| {
        std::array::from_fn(|_| {
            let table = Hashtable::new(|word: &usize| hash_ptr(*word), |a, b| a == b);
            Mutex::new(unwrap_or_fatal(table))
        })
    })
}

fn lock_stripe(word: usize) -> MutexGuard<'static, Stripe> {
    stripes()[hash_ptr(word) as usize & (STRIPE_COUNT - 1)]
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Acquires the monitor of `id`, blocking while another thread holds it.
///
/// The calling thread may enter a monitor it already holds; each entry
/// needs a matching [`sync_exit`]. Entering nil does nothing.
///
/// # Errors
///
/// Returns [`Error::OutOfMemory`] if the monitor table cannot grow.
pub fn sync_enter(id: Option<Id>) -> Result<()> {
    let Some(id) = id else {
        return Ok(());
    };
    let word = id.word();

    let monitor = {
        let mut stripe = lock_stripe(word);
        if let Some(entry) = stripe.get_mut(&word) {
            entry.users += 1;
            Arc::clone(&entry.monitor)
        } else {
            let monitor = Arc::new(Monitor::default());
            stripe.try_set(
                word,
                MonitorEntry {
                    monitor: Arc::clone(&monitor),
                    users: 1,
                },
            )?;
            monitor
        }
    };

    let current = thread::current().id();
    let mut owner = monitor.owner();
    while owner.thread.is_some_and(|thread| thread != current) {
        owner = monitor
            .released
            .wait(owner)
            .unwrap_or_else(PoisonError::into_inner);
    }
    owner.thread = Some(current);
    owner.depth += 1;
    Ok(())
}

/// Releases one entry of the monitor of `id`. Exiting nil does nothing.
///
/// # Errors
///
/// Returns [`Error::SyncNotOwned`] if the calling thread does not hold the
/// monitor.
pub fn sync_exit(id: Option<Id>) -> Result<()> {
    let Some(id) = id else {
        return Ok(());
    };
    let word = id.word();
    let current = thread::current().id();

    let mut stripe = lock_stripe(word);
    let Some(entry) = stripe.get_mut(&word) else {
        return Err(Error::SyncNotOwned);
    };

    {
        let mut owner = entry.monitor.owner();
        if owner.thread != Some(current) {
            return Err(Error::SyncNotOwned);
        }
        owner.depth -= 1;
        if owner.depth == 0 {
            owner.thread = None;
            entry.monitor.released.notify_one();
        }
    }

    entry.users -= 1;
    if entry.users == 0 {
        stripe.delete(&word);
    }
    Ok(())
}

struct MonitorExit(Id);

impl Drop for MonitorExit {
    fn drop(&mut self) {
        if let Err(error) = sync_exit(Some(self.0))
            && !thread::panicking()
        {
            fatal(error);
        }
    }
}

/// Runs `f` holding the monitor of `object`.
///
/// The monitor is released when `f` returns or unwinds.
pub fn synchronized<R>(object: &Object, f: impl FnOnce() -> R) -> R {
    unwrap_or_fatal(sync_enter(Some(object.id())));
    let _exit = MonitorExit(object.id());
    f()
}

/// How [`set_property`] takes ownership of the new value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PropertyCopy {
    /// Retain the value.
    #[default]
    Retain,
    /// Store the result of sending it `copy`.
    Copy,
    /// Store the result of sending it `mutableCopy`.
    MutableCopy,
}

impl PropertyCopy {
    fn selector_name(self) -> Option<&'static str> {
        match self {
            PropertyCopy::Retain => None,
            PropertyCopy::Copy => Some("copy"),
            PropertyCopy::MutableCopy => Some("mutableCopy"),
        }
    }
}

struct SpinLock(AtomicBool);

struct SpinGuard<'a>(&'a SpinLock);

impl SpinLock {
    const fn new() -> Self {
        SpinLock(AtomicBool::new(false))
    }

    fn lock(&self) -> SpinGuard<'_> {
        let mut spins = 0;
        while self
            .0
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            if spins < SPINS_BEFORE_YIELD {
                spins += 1;
                hint::spin_loop();
            } else {
                thread::yield_now();
            }
        }
        SpinGuard(self)
    }
}

impl Drop for SpinGuard<'_> {
    fn drop(&mut self) {
        self.0.0.store(false, Ordering::Release);
    }
}

static PROPERTY_LOCKS: [SpinLock; PROPERTY_LOCK_COUNT] =
    [const { SpinLock::new() }; PROPERTY_LOCK_COUNT];

fn property_lock(slot: &AtomicPtr<()>) -> &'static SpinLock {
    let addr = std::ptr::from_ref(slot).addr();
    &PROPERTY_LOCKS[hash_ptr(addr) as usize & (PROPERTY_LOCK_COUNT - 1)]
}

fn property_slot<'a>(object: &'a Object, ivar: &Ivar) -> &'a AtomicPtr<()> {
    // SAFETY: `ivar_ptr` checked size, alignment and bounds; `object` keeps
    // the storage alive, and the slot is only accessed atomically.
    unsafe { &*ivar_ptr::<AtomicPtr<()>>(object.id(), ivar) }
}

/// Reads the object-typed property stored in `ivar` of `object`.
///
/// The atomic form retains the value under the property lock and
/// autoreleases it, so it stays valid until the current pool is popped
/// even if another thread replaces the property.
///
/// # Panics
///
/// Panics if `object` is not a heap object or `ivar` is not a
/// pointer-sized slot inside it.
#[must_use]
pub fn get_property(object: &Object, ivar: &Ivar, atomic: bool) -> Option<Id> {
    let slot = property_slot(object, ivar);
    if !atomic {
        // SAFETY: the slot only ever holds words stored by `set_property`.
        return unsafe { Id::from_raw(slot.load(Ordering::Acquire)) };
    }

    let value = {
        let _guard = property_lock(slot).lock();
        // SAFETY: the slot owns a reference to its value, and setters
        // release the old value only after leaving this lock.
        unsafe { Id::from_raw(slot.load(Ordering::Acquire)).map(|id| retain(id)) }
    };
    // SAFETY: the reference taken above is handed to the pool.
    value.map(|id| unsafe { pool::autorelease(id) })
}

/// Replaces the property stored in `ivar` of `object` with `value`.
///
/// The previous value is released after the new one is in place. The
/// object's teardown is responsible for releasing the final value.
///
/// # Panics
///
/// See [`get_property`].
pub fn set_property(
    object: &Object,
    ivar: &Ivar,
    value: Option<&Object>,
    atomic: bool,
    copy: PropertyCopy,
) {
    let slot = property_slot(object, ivar);

    let new = match (value, copy.selector_name()) {
        (None, _) => None,
        (Some(value), None) => Some(value.clone().into_id()),
        (Some(value), Some(name)) => {
            let selector = unwrap_or_fatal(Selector::register(name));
            let word = value.send(selector, &[]);
            // SAFETY: copy methods return an owned receiver word.
            unsafe { Id::from_word(word) }
        }
    };
    let raw = Id::into_raw(new);

    let guard = atomic.then(|| property_lock(slot).lock());
    let old = slot.swap(raw, Ordering::AcqRel);
    drop(guard);

    // SAFETY: the slot owned the reference it held.
    if let Some(old) = unsafe { Id::from_raw(old) } {
        // SAFETY: see above.
        unsafe { release(old) };
    }
}
