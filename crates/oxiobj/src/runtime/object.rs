//! Object allocation and reference counting.
//!
//! # Memory Layout
//!
//! Every heap object is one block aligned to [`OBJECT_ALIGN`]:
//!
//! ```text
//! +----------------------+  offset 0
//! | refcount   (atomic)  |
//! | class      (atomic)  |
//! | flags      (atomic)  |
//! | alloc size           |
//! +----------------------+  HEADER_SIZE
//! | inherited ivars      |
//! | own ivars            |
//! +----------------------+  class.instance_size()
//! ```
//!
//! A retain count of [`CONSTANT_REFCOUNT`] marks a constant object: retain
//! and release leave it alone and it is never freed.
//!
//! # Handles
//!
//! - [`Id`] is the raw word a message is sent to: a heap object, a class
//!   or a tagged pointer. It carries no ownership, and the free functions that
//!   take one (`retain`, `release`, ...) are `unsafe` because the caller
//!   vouches that the object is alive.
//! - [`Object`] owns one reference: `Clone` retains, `Drop` releases.
//!
//! # Deallocation
//!
//! When the count goes from 1 to 0 the object is finalized exactly once:
//! the `destroyIvars` method of each class in the chain that defines one
//! directly runs, most-derived first; weak slots that still point at the
//! object are cleared; then the block is freed. For an object that has ever
//! been the target of a weak reference, the 1 to 0 transition happens under
//! the same lock weak loads take, so a load either retains the object before
//! the transition or sees it already dead.

use crate::error::{Error, Result};
use crate::runtime::class::{Class, ClassInner, Ivar};
use crate::runtime::fatal::{fatal, unwrap_or_fatal};
use crate::runtime::pool;
use crate::runtime::selector::Selector;
use crate::runtime::tagged::TaggedPointer;
use crate::runtime::weak;
use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::fmt;
use std::mem::ManuallyDrop;
use std::ptr::{self, NonNull};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

/// Retain count of constant objects.
pub const CONSTANT_REFCOUNT: usize = usize::MAX;

/// Alignment of every heap object; also the largest ivar alignment.
pub const OBJECT_ALIGN: usize = 16;

/// Size of the object header preceding instance variables.
pub const HEADER_SIZE: usize = size_of::<ObjectHeader>();

/// Selector of the per-class instance-variable teardown hook.
pub const DESTROY_IVARS: &str = "destroyIvars";

// Low bit set in the word of a class receiver; tagged pointers use bit 0.
const CLASS_MARKER: usize = 0b10;

const WEAKLY_REFERENCED: usize = 1;
const DEALLOCATING: usize = 1 << 1;

#[repr(C)]
pub(crate) struct ObjectHeader {
    refcount: AtomicUsize,
    class: AtomicPtr<ClassInner>,
    flags: AtomicUsize,
    alloc_size: usize,
}

impl ObjectHeader {
    pub(crate) fn refcount(&self) -> usize {
        self.refcount.load(Ordering::Acquire)
    }

    pub(crate) fn is_weakly_referenced(&self) -> bool {
        self.flags.load(Ordering::Acquire) & WEAKLY_REFERENCED != 0
    }

    /// Called with the object's weak stripe held.
    pub(crate) fn mark_weakly_referenced(&self) {
        self.flags.fetch_or(WEAKLY_REFERENCED, Ordering::SeqCst);
    }

    pub(crate) fn is_deallocating(&self) -> bool {
        self.flags.load(Ordering::Acquire) & DEALLOCATING != 0
    }

    fn class(&self) -> Class {
        // SAFETY: the class word only ever holds registered descriptors.
        unsafe { Class::from_ptr(self.class.load(Ordering::Acquire)) }
    }

    /// Decrements the count. Returns `Some(true)` if this call reached zero.
    ///
    /// With `stop_at_weak`, returns `None` instead of moving 1 to 0 when the
    /// object has become weakly referenced, so the caller can retry under
    /// the weak stripe lock.
    pub(crate) fn decrement(&self, addr: usize, stop_at_weak: bool) -> Option<bool> {
        let mut current = self.refcount.load(Ordering::Acquire);
        loop {
            match current {
                CONSTANT_REFCOUNT => return Some(false),
                0 => fatal(Error::DoubleRelease { ptr: addr }),
                1 if stop_at_weak && self.is_weakly_referenced() => return None,
                n => match self.refcount.compare_exchange_weak(
                    n,
                    n - 1,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(previous) => return Some(previous == 1),
                    Err(actual) => current = actual,
                },
            }
        }
    }

    /// Increments unless the count already reached zero.
    pub(crate) fn try_retain(&self) -> bool {
        let mut current = self.refcount.load(Ordering::Relaxed);
        loop {
            match current {
                CONSTANT_REFCOUNT => return true,
                0 => return false,
                n if n == CONSTANT_REFCOUNT - 1 => fatal(Error::RefCountOverflow),
                n => match self.refcount.compare_exchange_weak(
                    n,
                    n + 1,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => return true,
                    Err(actual) => current = actual,
                },
            }
        }
    }
}

/// Pointer to a live heap object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectPtr(NonNull<ObjectHeader>);

// SAFETY: object headers are only accessed through atomics; ivar access is
// `unsafe` and documented as externally synchronized.
unsafe impl Send for ObjectPtr {}
// SAFETY: see above.
unsafe impl Sync for ObjectPtr {}

impl ObjectPtr {
    /// Start of the object block.
    #[must_use]
    pub fn as_ptr(self) -> *mut u8 {
        self.0.as_ptr().cast()
    }

    /// Address of the object block.
    #[must_use]
    pub fn addr(self) -> usize {
        self.0.as_ptr().addr()
    }

    pub(crate) fn header_ptr(self) -> *mut ObjectHeader {
        self.0.as_ptr()
    }

    /// # Safety
    ///
    /// `header` must point at the header of a block from `allocate_instance`.
    pub(crate) unsafe fn from_header(header: NonNull<ObjectHeader>) -> ObjectPtr {
        ObjectPtr(header)
    }

    /// # Safety
    ///
    /// The object must not have been freed.
    pub(crate) unsafe fn header<'a>(self) -> &'a ObjectHeader {
        // SAFETY: guaranteed by the caller.
        unsafe { self.0.as_ref() }
    }
}

/// A message receiver: a heap object, a class or a tagged pointer.
///
/// `Option<Id>` is the nullable form; `None` is nil.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Id {
    /// A heap-allocated, reference-counted object.
    Object(ObjectPtr),
    /// A class receiving class methods. Never counted or freed.
    Class(Class),
    /// A value encoded in the pointer word itself.
    Tagged(TaggedPointer),
}

impl Id {
    /// Returns `true` for tagged pointers.
    #[must_use]
    pub fn is_tagged(self) -> bool {
        matches!(self, Id::Tagged(_))
    }

    /// The tagged pointer, if this is one.
    #[must_use]
    pub fn as_tagged(self) -> Option<TaggedPointer> {
        match self {
            Id::Tagged(tagged) => Some(tagged),
            _ => None,
        }
    }

    /// The class, if this receiver is one.
    #[must_use]
    pub fn as_class(self) -> Option<Class> {
        match self {
            Id::Class(class) => Some(class),
            _ => None,
        }
    }

    /// The heap object pointer, if this is one.
    #[must_use]
    pub fn as_object_ptr(self) -> Option<ObjectPtr> {
        match self {
            Id::Object(ptr) => Some(ptr),
            _ => None,
        }
    }

    /// The pointer-sized word this receiver is represented by.
    ///
    /// Heap words expose their provenance so [`Id::from_word`] can rebuild
    /// them.
    #[must_use]
    pub fn word(self) -> usize {
        match self {
            Id::Object(ptr) => ptr.header_ptr().expose_provenance(),
            Id::Class(class) => class.as_ptr().expose_provenance() | CLASS_MARKER,
            Id::Tagged(tagged) => tagged.word(),
        }
    }

    /// Rebuilds a receiver from [`Id::word`]; zero is nil.
    ///
    /// # Safety
    ///
    /// `word` must be zero or have come from [`Id::word`], and a heap object
    /// it names must not have been freed.
    #[must_use]
    pub unsafe fn from_word(word: usize) -> Option<Id> {
        if word == 0 {
            return None;
        }
        if let Some(tagged) = TaggedPointer::from_word(word) {
            return Some(Id::Tagged(tagged));
        }
        if word & CLASS_MARKER != 0 {
            let inner = ptr::with_exposed_provenance_mut::<ClassInner>(word & !CLASS_MARKER);
            // SAFETY: guaranteed by the caller.
            return Some(Id::Class(unsafe { Class::from_ptr(inner) }));
        }
        let header = ptr::with_exposed_provenance_mut::<ObjectHeader>(word);
        // SAFETY: non-zero, and guaranteed by the caller to be a header.
        Some(Id::Object(unsafe {
            ObjectPtr::from_header(NonNull::new_unchecked(header))
        }))
    }

    /// Pointer form of a nullable receiver, keeping provenance for heap
    /// words.
    pub(crate) fn into_raw(id: Option<Id>) -> *mut () {
        match id {
            None => ptr::null_mut(),
            Some(Id::Object(ptr)) => ptr.header_ptr().cast(),
            Some(Id::Class(class)) => class
                .as_ptr()
                .map_addr(|addr| addr | CLASS_MARKER)
                .cast(),
            Some(Id::Tagged(tagged)) => ptr::without_provenance_mut(tagged.word()),
        }
    }

    /// # Safety
    ///
    /// `raw` must come from [`Id::into_raw`], and a heap object it names
    /// must not have been freed.
    pub(crate) unsafe fn from_raw(raw: *mut ()) -> Option<Id> {
        if raw.is_null() {
            return None;
        }
        if let Some(tagged) = TaggedPointer::from_word(raw.addr()) {
            return Some(Id::Tagged(tagged));
        }
        if raw.addr() & CLASS_MARKER != 0 {
            let inner = raw.map_addr(|addr| addr & !CLASS_MARKER).cast::<ClassInner>();
            // SAFETY: guaranteed by the caller.
            return Some(Id::Class(unsafe { Class::from_ptr(inner) }));
        }
        // SAFETY: non-null, and guaranteed by the caller to be a header.
        Some(Id::Object(unsafe {
            ObjectPtr::from_header(NonNull::new_unchecked(raw.cast()))
        }))
    }
}

impl From<Class> for Id {
    fn from(class: Class) -> Self {
        Id::Class(class)
    }
}

impl From<TaggedPointer> for Id {
    fn from(tagged: TaggedPointer) -> Self {
        Id::Tagged(tagged)
    }
}

fn teardown_selector() -> Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    *SELECTOR.get_or_init(|| unwrap_or_fatal(Selector::register(DESTROY_IVARS)))
}

fn allocate_instance(class: Class, refcount: usize) -> Result<ObjectPtr> {
    if class.is_meta_class() {
        return Err(Error::MetaClassHasNoInstances {
            name: class.name().to_string(),
        });
    }
    if !class.is_registered() {
        return Err(Error::ClassNotRegistered {
            name: class.name().to_string(),
        });
    }

    let size = class.instance_size();
    let layout =
        Layout::from_size_align(size, OBJECT_ALIGN).map_err(|_| Error::OutOfMemory)?;

    // SAFETY: `size` is at least HEADER_SIZE, so the layout is non-zero.
    let raw = unsafe { alloc_zeroed(layout) }.cast::<ObjectHeader>();
    let Some(header) = NonNull::new(raw) else {
        return Err(Error::OutOfMemory);
    };

    // SAFETY: freshly allocated, suitably sized and aligned.
    unsafe {
        header.as_ptr().write(ObjectHeader {
            refcount: AtomicUsize::new(refcount),
            class: AtomicPtr::new(class.as_ptr()),
            flags: AtomicUsize::new(0),
            alloc_size: size,
        });
    }

    oxiobj_log::trace!("allocated {} at {:p}", class.name(), raw);
    Ok(ObjectPtr(header))
}

/// Runs teardown hooks, clears weak slots and frees the block.
///
/// # Safety
///
/// The caller performed the 1 to 0 transition of `ptr`.
unsafe fn finalize(ptr: ObjectPtr) {
    // SAFETY: the block is freed at the end of this function only.
    let header = unsafe { ptr.header() };
    header.flags.fetch_or(DEALLOCATING, Ordering::AcqRel);

    let class = header.class();
    if class.chain().any(Class::has_teardown) {
        let selector = teardown_selector();
        for class in class.chain().filter(|class| class.has_teardown()) {
            if let Some(method) = class.own_method(selector) {
                (method.implementation())(Id::Object(ptr), selector, &[]);
            }
        }
    }

    if header.is_weakly_referenced() {
        weak::clear_weak_references(ptr);
    }

    let size = header.alloc_size;
    oxiobj_log::trace!("freeing {} at {:#x}", class.name(), ptr.addr());

    // SAFETY: same layout as `allocate_instance` used for this block.
    unsafe {
        dealloc(
            ptr.as_ptr(),
            Layout::from_size_align_unchecked(size, OBJECT_ALIGN),
        );
    }
}

pub(crate) unsafe fn retain_object(ptr: ObjectPtr) {
    // SAFETY: guaranteed by the caller.
    let header = unsafe { ptr.header() };
    let mut current = header.refcount.load(Ordering::Relaxed);
    loop {
        match current {
            CONSTANT_REFCOUNT => return,
            0 => fatal(Error::ObjectDeallocated { ptr: ptr.addr() }),
            n if n == CONSTANT_REFCOUNT - 1 => fatal(Error::RefCountOverflow),
            n => match header.refcount.compare_exchange_weak(
                n,
                n + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            },
        }
    }
}

pub(crate) unsafe fn release_object(ptr: ObjectPtr) {
    // SAFETY: guaranteed by the caller.
    let header = unsafe { ptr.header() };

    let reached_zero = if header.is_weakly_referenced() {
        weak::release_weakly_referenced(ptr)
    } else {
        match header.decrement(ptr.addr(), true) {
            Some(reached_zero) => reached_zero,
            None => weak::release_weakly_referenced(ptr),
        }
    };

    if reached_zero {
        // SAFETY: this call performed the 1 to 0 transition.
        unsafe { finalize(ptr) };
    }
}

/// Increments the retain count of `id` and returns it.
///
/// Tagged pointers and constant objects are returned unchanged.
///
/// # Safety
///
/// `id` must refer to an object that has not been freed.
pub unsafe fn retain(id: Id) -> Id {
    if let Id::Object(ptr) = id {
        // SAFETY: guaranteed by the caller.
        unsafe { retain_object(ptr) };
    }
    id
}

/// Decrements the retain count of `id`, finalizing it at zero.
///
/// Releasing an object whose count is already zero is fatal.
///
/// # Safety
///
/// The caller must own one reference to `id`, which this call consumes.
pub unsafe fn release(id: Id) {
    if let Id::Object(ptr) = id {
        // SAFETY: guaranteed by the caller.
        unsafe { release_object(ptr) };
    }
}

/// Current retain count of `id`.
///
/// Classes, tagged pointers and constant objects report
/// [`CONSTANT_REFCOUNT`].
///
/// # Safety
///
/// `id` must refer to an object that has not been freed.
#[must_use]
pub unsafe fn retain_count(id: Id) -> usize {
    match id {
        // SAFETY: guaranteed by the caller.
        Id::Object(ptr) => unsafe { ptr.header() }.refcount(),
        Id::Class(_) | Id::Tagged(_) => CONSTANT_REFCOUNT,
    }
}

/// Class of `id`; for a class receiver, its metaclass.
///
/// A tagged pointer whose index has no bound class is fatal.
///
/// # Safety
///
/// `id` must refer to an object that has not been freed.
#[must_use]
pub unsafe fn object_get_class(id: Id) -> Class {
    match id {
        // SAFETY: guaranteed by the caller.
        Id::Object(ptr) => unsafe { ptr.header() }.class(),
        Id::Class(class) => class.metaclass(),
        Id::Tagged(tagged) => tagged.class().unwrap_or_else(|| {
            fatal(Error::TaggedClassNotRegistered {
                index: tagged.index(),
            })
        }),
    }
}

/// Name of the class of `id`.
///
/// # Safety
///
/// `id` must refer to an object that has not been freed.
#[must_use]
pub unsafe fn object_class_name(id: Id) -> &'static str {
    // SAFETY: guaranteed by the caller.
    unsafe { object_get_class(id) }.name()
}

/// Changes the class of `object`, returning the previous class.
///
/// # Errors
///
/// - [`Error::ClassNotRegistered`]: `class` is not registered.
/// - [`Error::MetaClassHasNoInstances`]: `class` is a metaclass.
/// - [`Error::IncompatibleClass`]: `object` is not a heap object, or its
///   storage is smaller than an instance of `class`.
pub fn object_set_class(object: &Object, class: Class) -> Result<Class> {
    if class.is_meta_class() {
        return Err(Error::MetaClassHasNoInstances {
            name: class.name().to_string(),
        });
    }
    if !class.is_registered() {
        return Err(Error::ClassNotRegistered {
            name: class.name().to_string(),
        });
    }

    let Id::Object(ptr) = object.id else {
        return Err(Error::IncompatibleClass {
            class: class.name().to_string(),
        });
    };

    // SAFETY: `object` holds a reference.
    let header = unsafe { ptr.header() };
    if class.instance_size() > header.alloc_size {
        return Err(Error::IncompatibleClass {
            class: class.name().to_string(),
        });
    }

    let old = header.class.swap(class.as_ptr(), Ordering::AcqRel);
    // SAFETY: the class word only ever holds registered descriptors.
    Ok(unsafe { Class::from_ptr(old) })
}

pub(crate) fn ivar_ptr<T>(id: Id, ivar: &Ivar) -> *mut T {
    let Id::Object(ptr) = id else {
        panic!("only heap objects have instance variables");
    };
    assert_eq!(
        size_of::<T>(),
        ivar.size(),
        "size mismatch for ivar '{}'",
        ivar.name()
    );
    assert!(
        align_of::<T>() <= ivar.align(),
        "alignment mismatch for ivar '{}'",
        ivar.name()
    );

    // SAFETY: callers of the public accessors vouch for liveness.
    let alloc_size = unsafe { ptr.header() }.alloc_size;
    assert!(
        ivar.offset() >= HEADER_SIZE && ivar.offset() + ivar.size() <= alloc_size,
        "ivar '{}' is outside the object",
        ivar.name()
    );

    // SAFETY: bounds checked above.
    unsafe { ptr.as_ptr().add(ivar.offset()).cast::<T>() }
}

/// Reads instance variable `ivar` of `id`.
///
/// # Panics
///
/// Panics if `id` is not a heap object, if `T` does not match the ivar's
/// size and alignment, or if the ivar lies outside the object.
///
/// # Safety
///
/// `id` must be alive, `T` must be valid for the stored bytes, and no other
/// thread may be writing the ivar concurrently.
#[must_use]
pub unsafe fn get_ivar<T: Copy>(id: Id, ivar: &Ivar) -> T {
    // SAFETY: guaranteed by the caller; bounds checked by `ivar_ptr`.
    unsafe { ivar_ptr::<T>(id, ivar).read() }
}

/// Writes instance variable `ivar` of `id`.
///
/// # Panics
///
/// Same conditions as [`get_ivar`].
///
/// # Safety
///
/// `id` must be alive and no other thread may access the ivar concurrently.
pub unsafe fn set_ivar<T: Copy>(id: Id, ivar: &Ivar, value: T) {
    // SAFETY: guaranteed by the caller; bounds checked by `ivar_ptr`.
    unsafe { ivar_ptr::<T>(id, ivar).write(value) }
}

/// An owned reference to a message receiver.
///
/// `Clone` retains and `Drop` releases. Tagged pointers are wrapped
/// without any counting.
pub struct Object {
    id: Id,
}

impl Object {
    /// Allocates a zeroed instance of `class` with a retain count of one.
    ///
    /// # Errors
    ///
    /// - [`Error::ClassNotRegistered`]: `class` is not registered.
    /// - [`Error::MetaClassHasNoInstances`]: `class` is a metaclass.
    /// - [`Error::OutOfMemory`]: the allocation failed.
    pub fn new(class: Class) -> Result<Self> {
        Ok(Object {
            id: Id::Object(allocate_instance(class, 1)?),
        })
    }

    /// Allocates a constant instance of `class` that is never freed.
    ///
    /// # Errors
    ///
    /// See [`Object::new`].
    pub fn new_constant(class: Class) -> Result<Self> {
        Ok(Object {
            id: Id::Object(allocate_instance(class, CONSTANT_REFCOUNT)?),
        })
    }

    /// Wraps a tagged pointer.
    #[must_use]
    pub fn from_tagged(tagged: TaggedPointer) -> Self {
        Object {
            id: Id::Tagged(tagged),
        }
    }

    /// Wraps a class as a receiver.
    #[must_use]
    pub fn from_class(class: Class) -> Self {
        Object {
            id: Id::Class(class),
        }
    }

    /// Takes ownership of a reference the caller already holds.
    ///
    /// # Safety
    ///
    /// The caller must own one reference to `id`; it is released on drop.
    #[must_use]
    pub unsafe fn from_retained(id: Id) -> Self {
        Object { id }
    }

    /// Retains `id` and wraps the new reference.
    ///
    /// # Safety
    ///
    /// `id` must refer to an object that has not been freed.
    #[must_use]
    pub unsafe fn retain_id(id: Id) -> Self {
        // SAFETY: guaranteed by the caller.
        Object {
            id: unsafe { retain(id) },
        }
    }

    /// The receiver word.
    #[must_use]
    pub fn id(&self) -> Id {
        self.id
    }

    /// Gives up ownership without releasing.
    #[must_use]
    pub fn into_id(self) -> Id {
        ManuallyDrop::new(self).id
    }

    /// Class of the receiver.
    #[must_use]
    pub fn class(&self) -> Class {
        // SAFETY: `self` holds a reference.
        unsafe { object_get_class(self.id) }
    }

    /// Name of the receiver's class.
    #[must_use]
    pub fn class_name(&self) -> &'static str {
        self.class().name()
    }

    /// Current retain count; [`CONSTANT_REFCOUNT`] for constants and
    /// tagged pointers.
    #[must_use]
    pub fn retain_count(&self) -> usize {
        // SAFETY: `self` holds a reference.
        unsafe { retain_count(self.id) }
    }

    /// Returns `true` if this wraps a tagged pointer.
    #[must_use]
    pub fn is_tagged(&self) -> bool {
        self.id.is_tagged()
    }

    /// Hands this reference to the current thread's top autorelease pool.
    ///
    /// The returned word stays valid until that pool is popped.
    #[must_use = "the returned id is the only handle to the autoreleased object"]
    pub fn autorelease(self) -> Id {
        // SAFETY: `into_id` transfers this reference to the pool.
        unsafe { pool::autorelease(self.into_id()) }
    }

    /// Reads instance variable `ivar`.
    ///
    /// # Safety
    ///
    /// See [`get_ivar`].
    #[must_use]
    pub unsafe fn ivar<T: Copy>(&self, ivar: &Ivar) -> T {
        // SAFETY: guaranteed by the caller; `self` keeps the object alive.
        unsafe { get_ivar(self.id, ivar) }
    }

    /// Writes instance variable `ivar`.
    ///
    /// # Safety
    ///
    /// See [`set_ivar`].
    pub unsafe fn set_ivar<T: Copy>(&self, ivar: &Ivar, value: T) {
        // SAFETY: guaranteed by the caller; `self` keeps the object alive.
        unsafe { set_ivar(self.id, ivar, value) }
    }
}

impl Clone for Object {
    fn clone(&self) -> Self {
        // SAFETY: `self` holds a reference.
        Object {
            id: unsafe { retain(self.id) },
        }
    }
}

impl Drop for Object {
    fn drop(&mut self) {
        // SAFETY: `self` owns one reference.
        unsafe { release(self.id) }
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Object {}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("class", &self.class_name())
            .field("id", &self.id)
            .finish()
    }
}

/// Replaces the strong reference in `slot` with `value`.
///
/// The new value is retained before the old one is released.
pub fn store_strong(slot: &mut Option<Object>, value: Option<&Object>) {
    if slot.as_ref() == value {
        return;
    }
    *slot = value.cloned();
}

/// Retains `object` and autoreleases the new reference.
///
/// The returned word outlives `object` until the enclosing pool is popped.
#[must_use]
pub fn retain_autorelease(object: &Object) -> Id {
    object.clone().autorelease()
}

/// Autoreleases a reference being returned to a caller.
#[must_use]
pub fn autorelease_return_value(object: Object) -> Id {
    object.autorelease()
}

/// Retains and autoreleases a borrowed value being returned to a caller.
#[must_use]
pub fn retain_autorelease_return_value(object: &Object) -> Id {
    retain_autorelease(object)
}

/// Claims an autoreleased return value, retaining it for the caller.
///
/// The pool still owns its reference; the returned [`Object`] owns a new
/// one.
///
/// # Safety
///
/// `id` must refer to an object that has not been freed.
#[must_use]
pub unsafe fn retain_autoreleased_return_value(id: Id) -> Object {
    // SAFETY: guaranteed by the caller.
    unsafe { Object::retain_id(id) }
}
