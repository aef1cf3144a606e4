//! Per-class inline method cache.
//!
//! Each class owns a small direct-mapped cache from selector to method
//! record, indexed by the selector's precomputed hash. Lookups never take a
//! lock: every slot is a seqlock, and readers retry through the slow path
//! whenever they observe a torn or in-progress write.
//!
//! # Invalidation
//!
//! Cached entries point at arena-resident [`Method`] records. Replacing an
//! implementation swaps the pointer inside the record, so cached entries see
//! the new implementation immediately. Adding a method can change which
//! record a selector resolves to (a subclass override, or a method appearing
//! where a superclass one was cached), so every add bumps a global dispatch
//! epoch. A slot is only served while the epoch stamped into it is current;
//! the stamp is taken before the resolving walk, so a fill racing with an
//! add is stale on arrival.

use crate::runtime::class::Method;
use crate::runtime::selector::{Selector, SelectorInner};
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU32, AtomicU64, Ordering, fence};

/// Number of slots in each class cache.
pub const CACHE_SLOTS: usize = 32;

const SLOT_MASK: usize = CACHE_SLOTS - 1;

// Starts at 1 so zeroed slots are never current.
static DISPATCH_EPOCH: AtomicU64 = AtomicU64::new(1);

/// Current dispatch epoch.
pub(crate) fn current_epoch() -> u64 {
    DISPATCH_EPOCH.load(Ordering::Acquire)
}

/// Invalidates every cached entry in every class.
pub(crate) fn bump_epoch() {
    DISPATCH_EPOCH.fetch_add(1, Ordering::AcqRel);
}

struct CacheSlot {
    seq: AtomicU32,
    selector: AtomicPtr<SelectorInner>,
    method: AtomicPtr<Method>,
    epoch: AtomicU64,
}

impl CacheSlot {
    const fn new() -> Self {
        CacheSlot {
            seq: AtomicU32::new(0),
            selector: AtomicPtr::new(ptr::null_mut()),
            method: AtomicPtr::new(ptr::null_mut()),
            epoch: AtomicU64::new(0),
        }
    }
}

pub(crate) struct MethodCache {
    slots: [CacheSlot; CACHE_SLOTS],
}

impl MethodCache {
    pub(crate) fn new() -> Self {
        MethodCache {
            slots: std::array::from_fn(|_| CacheSlot::new()),
        }
    }

    fn slot(&self, selector: Selector) -> &CacheSlot {
        &self.slots[selector.hash_value() as usize & SLOT_MASK]
    }

    /// Returns the cached record for `selector`, if the slot holds a current one.
    pub(crate) fn probe(&self, selector: Selector) -> Option<&'static Method> {
        let slot = self.slot(selector);

        let before = slot.seq.load(Ordering::Acquire);
        if before & 1 != 0 {
            return None;
        }

        let cached_selector = slot.selector.load(Ordering::Relaxed);
        let method = slot.method.load(Ordering::Relaxed);
        let epoch = slot.epoch.load(Ordering::Relaxed);

        fence(Ordering::Acquire);
        if slot.seq.load(Ordering::Relaxed) != before {
            return None;
        }

        if cached_selector != selector.as_ptr()
            || method.is_null()
            || epoch != current_epoch()
        {
            return None;
        }

        // SAFETY: method records are arena allocations that are never freed.
        Some(unsafe { &*method })
    }

    /// Stores `method` for `selector`, stamped with `epoch`.
    ///
    /// Gives up silently if another thread is writing the same slot.
    pub(crate) fn fill(&self, selector: Selector, method: &'static Method, epoch: u64) {
        let slot = self.slot(selector);

        let seq = slot.seq.load(Ordering::Relaxed);
        if seq & 1 != 0
            || slot
                .seq
                .compare_exchange(seq, seq.wrapping_add(1), Ordering::Acquire, Ordering::Relaxed)
                .is_err()
        {
            return;
        }
        // Orders the odd sequence before the data stores for readers.
        fence(Ordering::Release);

        slot.selector.store(selector.as_ptr(), Ordering::Relaxed);
        slot.method
            .store(ptr::from_ref(method).cast_mut(), Ordering::Relaxed);
        slot.epoch.store(epoch, Ordering::Relaxed);

        slot.seq.store(seq.wrapping_add(2), Ordering::Release);
    }

    /// Number of slots holding a current entry.
    pub(crate) fn occupancy(&self) -> usize {
        let epoch = current_epoch();
        self.slots
            .iter()
            .filter(|slot| {
                !slot.method.load(Ordering::Relaxed).is_null()
                    && slot.epoch.load(Ordering::Relaxed) == epoch
            })
            .count()
    }
}
