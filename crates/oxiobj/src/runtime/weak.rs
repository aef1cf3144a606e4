//! Zeroing weak references.
//!
//! A [`WeakSlot`] is a caller-owned word that holds nil, a tagged pointer,
//! or a heap object it does not keep alive. The runtime records, per
//! object, the addresses of every slot pointing at it; when the object is
//! finalized those slots are set to nil before its storage is freed.
//!
//! Slots are registered by address, so the API takes them pinned. The
//! [`Weak`] handle boxes and pins a slot for callers that do not want to
//! manage one.
//!
//! # Locking
//!
//! The side table is split into [`STRIPE_COUNT`] stripes, each a `Mutex`
//! around a [`Hashtable`] from object to slot list, chosen by object
//! address. One stripe lock covers:
//!
//! - loading a slot and retaining its target,
//! - the 1 to 0 transition of a weakly referenced object,
//! - clearing the object's slots before it is freed.
//!
//! Moving a slot from one object to another locks both stripes, lower
//! index first. No stripe lock is held while user code (teardown hooks)
//! runs.

use crate::runtime::fatal::unwrap_or_fatal;
use crate::runtime::hashtable::{Hashtable, hash_ptr};
use crate::runtime::object::{Id, Object, ObjectPtr};
use std::fmt;
use std::marker::PhantomPinned;
use std::pin::Pin;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

/// Number of independently locked weak-table stripes.
pub const STRIPE_COUNT: usize = 16;

#[derive(Clone, Copy, PartialEq, Eq)]
struct SlotPtr(NonNull<WeakSlot>);

// SAFETY: slots are only touched through their atomic word while the
// owning stripe is locked.
unsafe impl Send for SlotPtr {}

type Stripe = Hashtable<ObjectPtr, Vec<SlotPtr>>;

static STRIPES: OnceLock<[Mutex<Stripe>; STRIPE_COUNT]> = OnceLock::new();

fn stripes() -> &'static [Mutex<Stripe>; STRIPE_COUNT] {
    STRIPES.get_or_init(|| {
        std::array::from_fn(|_| {
            let table =
                Hashtable::new(|ptr: &ObjectPtr| hash_ptr(ptr.addr()), |a, b| a == b);
            Mutex::new(unwrap_or_fatal(table))
        })
    })
}

fn stripe_index(ptr: ObjectPtr) -> usize {
    // Objects are 16-byte aligned; skip the always-zero bits.
    (ptr.addr() >> 4) & (STRIPE_COUNT - 1)
}

fn lock(index: usize) -> MutexGuard<'static, Stripe> {
    stripes()[index]
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

struct StripeGuards {
    first: Option<(usize, MutexGuard<'static, Stripe>)>,
    second: Option<(usize, MutexGuard<'static, Stripe>)>,
}

impl StripeGuards {
    fn lock(a: Option<usize>, b: Option<usize>) -> Self {
        let (low, high) = match (a, b) {
            (Some(a), Some(b)) if a == b => (Some(a), None),
            (Some(a), Some(b)) => (Some(a.min(b)), Some(a.max(b))),
            (a, b) => (a.or(b), None),
        };

        StripeGuards {
            first: low.map(|index| (index, lock(index))),
            second: high.map(|index| (index, lock(index))),
        }
    }

    fn stripe(&mut self, index: usize) -> &mut Stripe {
        for (locked, guard) in [&mut self.first, &mut self.second].into_iter().flatten() {
            if *locked == index {
                return guard;
            }
        }
        unreachable!("weak stripe {index} is not locked");
    }
}

/// A pinned, caller-owned weak reference word.
///
/// A new slot is nil. Dropping a slot unregisters it.
pub struct WeakSlot {
    value: AtomicPtr<()>,
    _pinned: PhantomPinned,
}

impl WeakSlot {
    /// Creates a nil slot.
    #[must_use]
    pub const fn new() -> Self {
        WeakSlot {
            value: AtomicPtr::new(ptr::null_mut()),
            _pinned: PhantomPinned,
        }
    }

    /// Returns `true` if the slot currently holds nil.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.value.load(Ordering::Acquire).is_null()
    }

    fn as_slot_ptr(&self) -> SlotPtr {
        SlotPtr(NonNull::from(self))
    }
}

impl Default for WeakSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WeakSlot {
    fn drop(&mut self) {
        if self.is_nil() {
            return;
        }
        // SAFETY: a slot only becomes non-nil through a `Pin<&WeakSlot>`, so
        // it has not moved since.
        destroy_weak(unsafe { Pin::new_unchecked(&*self) });
    }
}

impl fmt::Debug for WeakSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakSlot")
            .field("value", &decode(self.value.load(Ordering::Acquire)))
            .finish()
    }
}

fn encode(id: Option<Id>) -> *mut () {
    Id::into_raw(id)
}

fn decode(raw: *mut ()) -> Option<Id> {
    // SAFETY: slots only ever hold `encode`d words, and heap targets are
    // cleared under their stripe lock before being freed.
    unsafe { Id::from_raw(raw) }
}

fn register(stripe: &mut Stripe, ptr: ObjectPtr, slot: SlotPtr) {
    match stripe.get_mut(&ptr) {
        Some(slots) => slots.push(slot),
        None => {
            stripe.set(ptr, vec![slot]);
        }
    }
}

fn unregister(stripe: &mut Stripe, ptr: ObjectPtr, slot: SlotPtr) {
    let Some(slots) = stripe.get_mut(&ptr) else {
        return;
    };
    if let Some(position) = slots.iter().position(|s| *s == slot) {
        slots.swap_remove(position);
    }
    if slots.is_empty() {
        stripe.delete(&ptr);
    }
}

/// Initializes a fresh slot to reference `value`.
///
/// Returns what the slot now holds: nil if `value` is nil, its class
/// forbids weak references, or it is being deallocated.
pub fn init_weak(slot: Pin<&WeakSlot>, value: Option<&Object>) -> Option<Id> {
    debug_assert!(slot.is_nil(), "init_weak on a slot that is already in use");
    store_weak(slot, value)
}

/// Points `slot` at `value`, unregistering it from its previous target.
///
/// Returns what the slot now holds; see [`init_weak`].
pub fn store_weak(slot: Pin<&WeakSlot>, value: Option<&Object>) -> Option<Id> {
    let slot = slot.get_ref();
    let slot_ptr = slot.as_slot_ptr();
    let new = value.map(Object::id);
    let new_ptr = new.and_then(Id::as_object_ptr);

    loop {
        let old_raw = slot.value.load(Ordering::Acquire);
        let old_ptr = decode(old_raw).and_then(Id::as_object_ptr);

        let mut guards =
            StripeGuards::lock(old_ptr.map(stripe_index), new_ptr.map(stripe_index));
        if slot.value.load(Ordering::Acquire) != old_raw {
            continue;
        }

        if let Some(old) = old_ptr {
            unregister(guards.stripe(stripe_index(old)), old, slot_ptr);
        }

        let stored = match (new, value) {
            (Some(Id::Object(ptr)), Some(object)) => {
                // SAFETY: `object` holds a reference.
                let header = unsafe { ptr.header() };
                if object.class().allows_weak_references()
                    && header.refcount() != 0
                    && !header.is_deallocating()
                {
                    register(guards.stripe(stripe_index(ptr)), ptr, slot_ptr);
                    header.mark_weakly_referenced();
                    new
                } else {
                    None
                }
            }
            (other, _) => other,
        };

        slot.value.store(encode(stored), Ordering::Release);
        return stored;
    }
}

/// Loads `slot`, returning a new strong reference to its target.
///
/// Returns `None` if the slot is nil or its target is being deallocated.
#[must_use]
pub fn load_weak(slot: Pin<&WeakSlot>) -> Option<Object> {
    let slot = slot.get_ref();

    loop {
        let raw = slot.value.load(Ordering::Acquire);
        let ptr = match decode(raw)? {
            Id::Tagged(tagged) => return Some(Object::from_tagged(tagged)),
            Id::Class(class) => return Some(Object::from_class(class)),
            Id::Object(ptr) => ptr,
        };

        let _guard = lock(stripe_index(ptr));
        if slot.value.load(Ordering::Acquire) != raw {
            continue;
        }

        // SAFETY: the slot still points at `ptr` under the stripe lock, and
        // finalization clears slots under this lock before freeing.
        let header = unsafe { ptr.header() };
        if header.try_retain() {
            // SAFETY: `try_retain` produced the reference being wrapped.
            return Some(unsafe { Object::from_retained(Id::Object(ptr)) });
        }
        return None;
    }
}

/// Sets `slot` to nil and unregisters it.
pub fn destroy_weak(slot: Pin<&WeakSlot>) {
    store_weak(slot, None);
}

/// Makes `dst` reference whatever `src` currently references.
pub fn copy_weak(dst: Pin<&WeakSlot>, src: Pin<&WeakSlot>) {
    let value = load_weak(src);
    store_weak(dst, value.as_ref());
}

/// Moves the reference in `src` to `dst`, leaving `src` nil.
pub fn move_weak(dst: Pin<&WeakSlot>, src: Pin<&WeakSlot>) {
    copy_weak(dst, src);
    destroy_weak(src);
}

/// Number of slots currently registered against `object`.
#[must_use]
pub fn weak_reference_count(object: &Object) -> usize {
    let Id::Object(ptr) = object.id() else {
        return 0;
    };
    lock(stripe_index(ptr)).get(&ptr).map_or(0, Vec::len)
}

/// Releases a weakly referenced object with its stripe held.
///
/// Returns `true` if this call reached zero.
pub(crate) fn release_weakly_referenced(ptr: ObjectPtr) -> bool {
    let _guard = lock(stripe_index(ptr));
    // SAFETY: the caller owns a reference being released.
    let header = unsafe { ptr.header() };
    header.decrement(ptr.addr(), false) == Some(true)
}

/// Sets every slot registered against `ptr` to nil.
pub(crate) fn clear_weak_references(ptr: ObjectPtr) {
    let mut stripe = lock(stripe_index(ptr));
    let Some(slots) = stripe.delete(&ptr) else {
        return;
    };

    let raw = encode(Some(Id::Object(ptr)));
    for slot in slots {
        // SAFETY: registered slots are pinned and unregister themselves
        // (under this lock) before they are dropped.
        let slot = unsafe { slot.0.as_ref() };
        let _ = slot.value.compare_exchange(
            raw,
            ptr::null_mut(),
            Ordering::AcqRel,
            Ordering::Relaxed,
        );
    }
}

/// A heap-pinned weak reference.
pub struct Weak {
    slot: Pin<Box<WeakSlot>>,
}

impl Weak {
    /// A weak reference to `object`.
    #[must_use]
    pub fn new(object: &Object) -> Self {
        let weak = Weak::nil();
        weak.set(Some(object));
        weak
    }

    /// A nil weak reference.
    #[must_use]
    pub fn nil() -> Self {
        Weak {
            slot: Box::pin(WeakSlot::new()),
        }
    }

    /// Strong reference to the target, if it is still alive.
    #[must_use]
    pub fn load(&self) -> Option<Object> {
        load_weak(self.slot.as_ref())
    }

    /// Retargets this reference.
    pub fn set(&self, object: Option<&Object>) {
        store_weak(self.slot.as_ref(), object);
    }

    /// Returns `true` if the reference is nil.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.slot.is_nil()
    }

    /// The underlying pinned slot.
    #[must_use]
    pub fn slot(&self) -> Pin<&WeakSlot> {
        self.slot.as_ref()
    }
}

impl Clone for Weak {
    fn clone(&self) -> Self {
        let weak = Weak::nil();
        copy_weak(weak.slot(), self.slot());
        weak
    }
}

impl Default for Weak {
    fn default() -> Self {
        Self::nil()
    }
}

impl fmt::Debug for Weak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Weak").field(&*self.slot).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::class::Class;
    use crate::runtime::registry::{allocate_class_pair, register_class_pair};
    use crate::runtime::tagged::TaggedPointer;
    use std::pin::pin;
    use std::sync::atomic::AtomicUsize;

    static NEXT: AtomicUsize = AtomicUsize::new(0);

    fn registered_class(prefix: &str) -> Class {
        let name = format!("{prefix}{}", NEXT.fetch_add(1, Ordering::Relaxed));
        let class = allocate_class_pair(None, &name, 0).unwrap();
        register_class_pair(class);
        class
    }

    #[test]
    fn test_load_returns_retained_reference() {
        let object = Object::new(registered_class("WeakTestLoad")).unwrap();
        let slot = pin!(WeakSlot::new());

        assert_eq!(init_weak(slot.as_ref(), Some(&object)), Some(object.id()));
        assert_eq!(weak_reference_count(&object), 1);

        let loaded = load_weak(slot.as_ref()).unwrap();
        assert_eq!(loaded, object);
        assert_eq!(object.retain_count(), 2);
        drop(loaded);
        assert_eq!(object.retain_count(), 1);
    }

    #[test]
    fn test_slot_cleared_on_dealloc() {
        let object = Object::new(registered_class("WeakTestClear")).unwrap();
        let slot = pin!(WeakSlot::new());
        init_weak(slot.as_ref(), Some(&object));

        drop(object);
        assert!(slot.is_nil());
        assert!(load_weak(slot.as_ref()).is_none());
    }

    #[test]
    fn test_store_moves_registration() {
        let class = registered_class("WeakTestStore");
        let a = Object::new(class).unwrap();
        let b = Object::new(class).unwrap();
        let slot = pin!(WeakSlot::new());

        init_weak(slot.as_ref(), Some(&a));
        store_weak(slot.as_ref(), Some(&b));
        assert_eq!(weak_reference_count(&a), 0);
        assert_eq!(weak_reference_count(&b), 1);

        drop(a);
        assert_eq!(load_weak(slot.as_ref()), Some(b.clone()));

        destroy_weak(slot.as_ref());
        assert_eq!(weak_reference_count(&b), 0);
        assert!(slot.is_nil());
    }

    #[test]
    fn test_disallowed_class_leaves_nil() {
        let class = registered_class("WeakTestDisallowed");
        class.set_allows_weak_references(false);
        let object = Object::new(class).unwrap();
        let slot = pin!(WeakSlot::new());

        assert_eq!(init_weak(slot.as_ref(), Some(&object)), None);
        assert!(slot.is_nil());
        assert_eq!(weak_reference_count(&object), 0);
    }

    #[test]
    fn test_tagged_pointer_stored_verbatim() {
        let tagged = TaggedPointer::new(2, 99).unwrap();
        let object = Object::from_tagged(tagged);
        let slot = pin!(WeakSlot::new());

        assert_eq!(store_weak(slot.as_ref(), Some(&object)), Some(Id::Tagged(tagged)));
        assert_eq!(weak_reference_count(&object), 0);
        assert_eq!(load_weak(slot.as_ref()).map(|o| o.id()), Some(Id::Tagged(tagged)));
    }

    #[test]
    fn test_class_stored_verbatim() {
        let class = registered_class("WeakTestClassTarget");
        let receiver = Object::from_class(class);
        let slot = pin!(WeakSlot::new());

        assert_eq!(store_weak(slot.as_ref(), Some(&receiver)), Some(Id::Class(class)));
        assert_eq!(weak_reference_count(&receiver), 0);
        assert_eq!(load_weak(slot.as_ref()), Some(receiver));
    }

    #[test]
    fn test_copy_and_move() {
        let object = Object::new(registered_class("WeakTestCopy")).unwrap();
        let src = pin!(WeakSlot::new());
        let copy = pin!(WeakSlot::new());
        let moved = pin!(WeakSlot::new());

        init_weak(src.as_ref(), Some(&object));
        copy_weak(copy.as_ref(), src.as_ref());
        assert_eq!(weak_reference_count(&object), 2);

        move_weak(moved.as_ref(), src.as_ref());
        assert!(src.is_nil());
        assert_eq!(weak_reference_count(&object), 2);

        drop(object);
        assert!(copy.is_nil());
        assert!(moved.is_nil());
    }

    #[test]
    fn test_dropping_slot_unregisters() {
        let object = Object::new(registered_class("WeakTestDrop")).unwrap();
        {
            let slot = pin!(WeakSlot::new());
            init_weak(slot.as_ref(), Some(&object));
            assert_eq!(weak_reference_count(&object), 1);
        }
        assert_eq!(weak_reference_count(&object), 0);
    }

    #[test]
    fn test_weak_handle() {
        let object = Object::new(registered_class("WeakTestHandle")).unwrap();
        let weak = Weak::new(&object);
        let other = weak.clone();

        assert_eq!(weak.load(), Some(object.clone()));
        assert_eq!(weak_reference_count(&object), 2);

        drop(object);
        assert!(weak.is_nil());
        assert!(other.load().is_none());
    }

    #[test]
    fn test_stripe_guards_lock_each_stripe_once() {
        {
            let mut guards = StripeGuards::lock(Some(3), Some(3));
            assert!(guards.second.is_none());
            let _ = guards.stripe(3);
        }

        let mut guards = StripeGuards::lock(Some(9), Some(2));
        assert_eq!(guards.first.as_ref().map(|(i, _)| *i), Some(2));
        let _ = guards.stripe(9);
    }
}
