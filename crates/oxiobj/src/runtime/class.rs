//! Class descriptors, method records and instance-variable layout.
//!
//! A [`Class`] is a `Copy` handle to a descriptor allocated in the metadata
//! arena. Descriptors are created by
//! [`allocate_class_pair`](crate::runtime::registry::allocate_class_pair),
//! grow instance variables until they are registered, and live for the rest
//! of the process.
//!
//! # Metaclasses
//!
//! Every class is allocated together with a metaclass holding its class
//! methods. Sending a message to a class dispatches through the metaclass:
//!
//! ```text
//! Base ───────────► Derived          (instance methods)
//!  │                  │
//! Base meta ──────► Derived meta     (class methods)
//!  ▲
//!  └── superclass of the root metaclass is the root class
//! ```
//!
//! The first message to a class or one of its instances sends it
//! `initialize` (superclasses first), once per class.
//!
//! # Lifecycle
//!
//! 1. **Allocated**: superclass and base instance size are fixed; ivars and
//!    methods may be added.
//! 2. **Registered**: visible through the registry and instantiable. The
//!    layout is frozen; methods may still be added or replaced.
//!
//! # Thread Safety
//!
//! - The method table and ivar list each sit behind the class's own
//!   `RwLock`.
//! - Dispatch reads through the lock-free [`MethodCache`]; see
//!   [`cache`](crate::runtime::cache) for how additions and replacements
//!   stay visible to cached lookups.

use crate::error::{Error, Result};
use crate::runtime::cache::{self, MethodCache};
use crate::runtime::fatal::unwrap_or_fatal;
use crate::runtime::hashtable::Hashtable;
use crate::runtime::object::{DESTROY_IVARS, Id, OBJECT_ALIGN};
use crate::runtime::protocol::Protocol;
use crate::runtime::selector::Selector;
use oxiobj_mem::metadata_arena;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};
use std::sync::{
    Condvar, Mutex, MutexGuard, OnceLock, PoisonError, RwLock, RwLockReadGuard,
    RwLockWriteGuard,
};
use std::thread::{self, ThreadId};

/// Class method sent once before a class receives its first message.
pub const INITIALIZE: &str = "initialize";

/// Method implementation.
///
/// Receives the receiver, the selector that was sent and the message
/// arguments as machine words, and returns one machine word.
pub type Imp = fn(receiver: Id, selector: Selector, args: &[usize]) -> usize;

/// Per-class hook consulted when a selector has no method anywhere in the
/// class chain.
///
/// Return `true` after adding a method for `selector` to have the lookup
/// retried once.
pub type MethodResolver = fn(class: Class, selector: Selector) -> bool;

fn imp_to_ptr(imp: Imp) -> *mut () {
    imp as *mut ()
}

/// # Safety
///
/// `raw` must have been produced by [`imp_to_ptr`].
unsafe fn imp_from_ptr(raw: *mut ()) -> Imp {
    // SAFETY: `raw` was produced from an `Imp` by `imp_to_ptr`.
    unsafe { std::mem::transmute::<*mut (), Imp>(raw) }
}

/// A method record: selector, replaceable implementation and type encoding.
///
/// Records are allocated in the metadata arena and shared by the owning
/// class's method table and every dispatch cache that resolved to them.
pub struct Method {
    selector: Selector,
    imp: AtomicPtr<()>,
    types: &'static str,
}

impl Method {
    /// Selector this method answers.
    #[must_use]
    pub fn selector(&self) -> Selector {
        self.selector
    }

    /// Current implementation.
    #[must_use]
    pub fn implementation(&self) -> Imp {
        // SAFETY: the slot only ever holds pointers stored by `imp_to_ptr`.
        unsafe { imp_from_ptr(self.imp.load(Ordering::Acquire)) }
    }

    /// Opaque type-encoding string supplied when the method was added.
    #[must_use]
    pub fn types(&self) -> &'static str {
        self.types
    }

    fn exchange_implementation(&self, imp: Imp) -> Imp {
        let old = self.imp.swap(imp_to_ptr(imp), Ordering::AcqRel);
        // SAFETY: the slot only ever holds pointers stored by `imp_to_ptr`.
        unsafe { imp_from_ptr(old) }
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("selector", &self.selector)
            .field("types", &self.types)
            .finish_non_exhaustive()
    }
}

/// Instance-variable descriptor.
///
/// `offset` is measured from the start of the object, header included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ivar {
    name: &'static str,
    offset: usize,
    size: usize,
    align: usize,
    type_tag: &'static str,
}

impl Ivar {
    /// Name of the instance variable.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Byte offset from the start of the object.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Alignment in bytes.
    #[must_use]
    pub fn align(&self) -> usize {
        self.align
    }

    /// Opaque type tag supplied when the ivar was added.
    #[must_use]
    pub fn type_tag(&self) -> &'static str {
        self.type_tag
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum InitPhase {
    Pending,
    Running(ThreadId),
    Done,
}

struct InitState {
    done: AtomicBool,
    phase: Mutex<InitPhase>,
    finished: Condvar,
}

impl InitState {
    fn new() -> Self {
        InitState {
            done: AtomicBool::new(false),
            phase: Mutex::new(InitPhase::Pending),
            finished: Condvar::new(),
        }
    }

    fn phase(&self) -> MutexGuard<'_, InitPhase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Marks a class initialized when dropped, even while unwinding.
struct InitFinish(Class);

impl Drop for InitFinish {
    fn drop(&mut self) {
        let init = &self.0.inner.init;
        *init.phase() = InitPhase::Done;
        init.done.store(true, Ordering::Release);
        init.finished.notify_all();
    }
}

pub(crate) struct ClassInner {
    name: &'static str,
    module: &'static str,
    superclass: Option<Class>,
    is_meta: bool,
    // Class <-> metaclass; set before the pair is handed out.
    pair: AtomicPtr<ClassInner>,
    registered: AtomicBool,
    instance_size: AtomicUsize,
    ivars: RwLock<Vec<Ivar>>,
    methods: RwLock<Hashtable<Selector, &'static Method>>,
    cache: MethodCache,
    allows_weak: AtomicBool,
    has_teardown: AtomicBool,
    resolver: RwLock<Option<MethodResolver>>,
    protocols: RwLock<Vec<Protocol>>,
    init: InitState,
}

/// Handle to a class descriptor.
///
/// Equality and hashing are by identity.
#[derive(Clone, Copy)]
pub struct Class {
    inner: &'static ClassInner,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn align_up(value: usize, align: usize) -> Option<usize> {
    value.checked_add(align - 1).map(|v| v & !(align - 1))
}

fn initialize_selector() -> Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    *SELECTOR.get_or_init(|| unwrap_or_fatal(Selector::register(INITIALIZE)))
}

fn allocate_inner(
    module: &'static str,
    name: &'static str,
    superclass: Option<Class>,
    is_meta: bool,
    instance_size: usize,
) -> Result<&'static ClassInner> {
    let methods = Hashtable::new(|sel: &Selector| sel.hash_value(), |a, b| a == b)?;

    metadata_arena()
        .try_alloc(ClassInner {
            name,
            module,
            superclass,
            is_meta,
            pair: AtomicPtr::new(ptr::null_mut()),
            registered: AtomicBool::new(false),
            instance_size: AtomicUsize::new(instance_size),
            ivars: RwLock::new(Vec::new()),
            methods: RwLock::new(methods),
            cache: MethodCache::new(),
            allows_weak: AtomicBool::new(true),
            has_teardown: AtomicBool::new(false),
            resolver: RwLock::new(None),
            protocols: RwLock::new(Vec::new()),
            init: InitState::new(),
        })
        .map_err(|_| Error::OutOfMemory)
}

impl Class {
    /// Allocates an unregistered class and its metaclass in the metadata
    /// arena.
    ///
    /// The metaclass inherits from the superclass's metaclass, or from the
    /// new class itself when it is a root class.
    pub(crate) fn allocate(
        module: &str,
        name: &str,
        superclass: Option<Class>,
        instance_size: usize,
    ) -> Result<Class> {
        let arena = metadata_arena();
        let name = arena.try_alloc_str(name).map_err(|_| Error::OutOfMemory)?;
        let module = arena.try_alloc_str(module).map_err(|_| Error::OutOfMemory)?;

        let class = Class {
            inner: allocate_inner(module, name, superclass, false, instance_size)?,
        };
        let meta_superclass = superclass.map_or(class, Class::metaclass);
        let meta = Class {
            inner: allocate_inner(module, name, Some(meta_superclass), true, 0)?,
        };

        class.inner.pair.store(meta.as_ptr(), Ordering::Release);
        meta.inner.pair.store(class.as_ptr(), Ordering::Release);
        Ok(class)
    }

    fn pair(self) -> Class {
        // SAFETY: `allocate` links both halves before either escapes.
        unsafe { Class::from_ptr(self.inner.pair.load(Ordering::Acquire)) }
    }

    /// Returns `true` for metaclasses.
    #[must_use]
    pub fn is_meta_class(self) -> bool {
        self.inner.is_meta
    }

    /// The metaclass holding this class's class methods.
    ///
    /// For a metaclass this is the root metaclass.
    #[must_use]
    pub fn metaclass(self) -> Class {
        if self.is_meta_class() {
            let root = self.instance_class().chain().last().unwrap_or(self);
            root.pair()
        } else {
            self.pair()
        }
    }

    /// The class a metaclass describes; `self` for ordinary classes.
    #[must_use]
    pub fn instance_class(self) -> Class {
        if self.is_meta_class() { self.pair() } else { self }
    }

    /// This class as a message receiver.
    #[must_use]
    pub fn id(self) -> Id {
        Id::Class(self)
    }

    /// Class name.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.inner.name
    }

    /// Name of the module that created the class.
    #[must_use]
    pub fn module(self) -> &'static str {
        self.inner.module
    }

    /// Superclass, or `None` for a root class.
    #[must_use]
    pub fn superclass(self) -> Option<Class> {
        self.inner.superclass
    }

    /// Size of an instance in bytes, header included.
    #[must_use]
    pub fn instance_size(self) -> usize {
        self.inner.instance_size.load(Ordering::Acquire)
    }

    /// Returns `true` once the class has been registered.
    ///
    /// A metaclass is registered together with its class.
    #[must_use]
    pub fn is_registered(self) -> bool {
        self.instance_class().inner.registered.load(Ordering::Acquire)
    }

    /// Holds the layout lock and flips the registered flag.
    ///
    /// Returns `false` if the class was already registered.
    pub(crate) fn mark_registered(self) -> bool {
        let _layout = write(&self.inner.ivars);
        !self.inner.registered.swap(true, Ordering::Release)
    }

    /// Returns `true` if `self` is `other` or inherits from it.
    #[must_use]
    pub fn is_subclass_of(self, other: Class) -> bool {
        self.chain().any(|class| class == other)
    }

    /// Iterates from `self` up to the root class.
    pub fn chain(self) -> impl Iterator<Item = Class> {
        std::iter::successors(Some(self), |class| class.superclass())
    }

    /// Instance variables declared directly on this class.
    #[must_use]
    pub fn ivars(self) -> Vec<Ivar> {
        read(&self.inner.ivars).clone()
    }

    /// Finds an instance variable by name in this class or a superclass.
    #[must_use]
    pub fn ivar(self, name: &str) -> Option<Ivar> {
        self.chain()
            .find_map(|class| read(&class.inner.ivars).iter().find(|i| i.name == name).copied())
    }

    /// Appends an instance variable to the class layout.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidAlignment`]: `align` is not a power of two or is
    ///   larger than the object alignment.
    /// - [`Error::ClassAlreadyRegistered`]: the layout is frozen.
    /// - [`Error::IvarAlreadyExists`]: the name is used in the class chain.
    /// - [`Error::MetaClassHasNoInstances`]: `self` is a metaclass.
    pub fn add_ivar(
        self,
        name: &str,
        size: usize,
        align: usize,
        type_tag: &str,
    ) -> Result<Ivar> {
        if self.is_meta_class() {
            return Err(Error::MetaClassHasNoInstances {
                name: self.name().to_string(),
            });
        }
        if !align.is_power_of_two() || align > OBJECT_ALIGN {
            return Err(Error::InvalidAlignment { alignment: align });
        }

        let mut ivars = write(&self.inner.ivars);
        if self.is_registered() {
            return Err(Error::ClassAlreadyRegistered {
                name: self.name().to_string(),
            });
        }

        let inherited = self.superclass().and_then(|sup| sup.ivar(name));
        if inherited.is_some() || ivars.iter().any(|i| i.name == name) {
            return Err(Error::IvarAlreadyExists {
                name: name.to_string(),
            });
        }

        let offset =
            align_up(self.instance_size(), align).ok_or(Error::OutOfMemory)?;
        let end = offset.checked_add(size).ok_or(Error::OutOfMemory)?;

        let arena = metadata_arena();
        let ivar = Ivar {
            name: arena.try_alloc_str(name).map_err(|_| Error::OutOfMemory)?,
            offset,
            size,
            align,
            type_tag: arena
                .try_alloc_str(type_tag)
                .map_err(|_| Error::OutOfMemory)?,
        };

        ivars.push(ivar);
        self.inner.instance_size.store(end, Ordering::Release);
        Ok(ivar)
    }

    /// Adds a method to this class's own table.
    ///
    /// Returns `false`, leaving the table unchanged, if this class already
    /// defines `selector`. Methods inherited from a superclass do not count:
    /// adding one here overrides it.
    pub fn add_method(self, selector: Selector, imp: Imp, types: &str) -> bool {
        let mut methods = write(&self.inner.methods);
        if methods.contains_key(&selector) {
            return false;
        }

        self.insert_method(&mut methods, selector, imp, types);
        let registered = self.is_registered();
        drop(methods);

        oxiobj_log::trace!("added {}{selector} to {}", self.method_sigil(), self.name());
        if registered {
            cache::bump_epoch();
        }
        true
    }

    /// Sets the implementation of `selector` in this class's own table.
    ///
    /// Returns the previous implementation, or `None` if the method was
    /// added. A replacement is visible to every subsequent dispatch,
    /// including dispatches served from a cache.
    pub fn replace_method(
        self,
        selector: Selector,
        imp: Imp,
        types: &str,
    ) -> Option<Imp> {
        let mut methods = write(&self.inner.methods);
        if let Some(method) = methods.get(&selector) {
            let old = method.exchange_implementation(imp);
            oxiobj_log::trace!(
                "replaced {}{selector} on {}",
                self.method_sigil(),
                self.name()
            );
            return Some(old);
        }

        self.insert_method(&mut methods, selector, imp, types);
        let registered = self.is_registered();
        drop(methods);

        oxiobj_log::trace!(
            "added {}{selector} to {} by replace",
            self.method_sigil(),
            self.name()
        );
        if registered {
            cache::bump_epoch();
        }
        None
    }

    fn method_sigil(self) -> char {
        if self.is_meta_class() { '+' } else { '-' }
    }

    /// Adds a class method; see [`Class::add_method`].
    pub fn add_class_method(self, selector: Selector, imp: Imp, types: &str) -> bool {
        self.metaclass().add_method(selector, imp, types)
    }

    /// Sets a class method; see [`Class::replace_method`].
    pub fn replace_class_method(
        self,
        selector: Selector,
        imp: Imp,
        types: &str,
    ) -> Option<Imp> {
        self.metaclass().replace_method(selector, imp, types)
    }

    /// Finds a class method in this class or a superclass.
    #[must_use]
    pub fn class_method(self, selector: Selector) -> Option<&'static Method> {
        self.metaclass().instance_method(selector)
    }

    /// Returns `true` if the class itself responds to `selector`.
    #[must_use]
    pub fn responds_to_class_method(self, selector: Selector) -> bool {
        self.metaclass().responds_to(selector)
    }

    fn insert_method(
        self,
        methods: &mut Hashtable<Selector, &'static Method>,
        selector: Selector,
        imp: Imp,
        types: &str,
    ) {
        let arena = metadata_arena();
        let types = unwrap_or_fatal(
            arena.try_alloc_str(types).map_err(|_| Error::OutOfMemory),
        );
        let method = unwrap_or_fatal(
            arena
                .try_alloc(Method {
                    selector,
                    imp: AtomicPtr::new(imp_to_ptr(imp)),
                    types,
                })
                .map_err(|_| Error::OutOfMemory),
        );

        methods.set(selector, method);
        if selector.name() == DESTROY_IVARS {
            self.inner.has_teardown.store(true, Ordering::Release);
        }
    }

    /// Method defined directly on this class, ignoring superclasses.
    #[must_use]
    pub fn own_method(self, selector: Selector) -> Option<&'static Method> {
        read(&self.inner.methods).get(&selector).copied()
    }

    /// Methods defined directly on this class, in no particular order.
    #[must_use]
    pub fn methods(self) -> Vec<&'static Method> {
        read(&self.inner.methods).values().copied().collect()
    }

    /// Finds `selector` in this class or the nearest superclass defining it.
    ///
    /// Walks the method tables without touching the dispatch cache.
    #[must_use]
    pub fn instance_method(self, selector: Selector) -> Option<&'static Method> {
        self.chain().find_map(|class| class.own_method(selector))
    }

    /// Cached lookup through the class chain.
    ///
    /// Does not consult resolvers or the forward handler. Unregistered
    /// classes are never cached, since their additions do not bump the
    /// dispatch epoch.
    pub(crate) fn resolve(self, selector: Selector) -> Option<&'static Method> {
        if let Some(method) = self.inner.cache.probe(selector) {
            return Some(method);
        }

        let registered = self.is_registered();
        let epoch = cache::current_epoch();
        let method = self.instance_method(selector)?;
        if registered {
            self.inner.cache.fill(selector, method, epoch);
        }
        Some(method)
    }

    /// Returns `true` if instances respond to `selector` without forwarding.
    #[must_use]
    pub fn responds_to(self, selector: Selector) -> bool {
        self.resolve(selector).is_some()
    }

    /// Implementation dispatch would use for `selector`, without forwarding.
    #[must_use]
    pub fn method_implementation(self, selector: Selector) -> Option<Imp> {
        self.resolve(selector).map(Method::implementation)
    }

    /// Number of dispatch cache slots currently holding a valid entry.
    #[must_use]
    pub fn cached_method_count(self) -> usize {
        self.inner.cache.occupancy()
    }

    pub(crate) fn has_teardown(self) -> bool {
        self.inner.has_teardown.load(Ordering::Acquire)
    }

    /// Whether instances may be the target of weak references.
    #[must_use]
    pub fn allows_weak_references(self) -> bool {
        self.inner.allows_weak.load(Ordering::Acquire)
    }

    /// Allows or forbids weak references to instances of this class.
    ///
    /// Weak slots assigned an instance of a forbidding class stay nil.
    pub fn set_allows_weak_references(self, allows: bool) {
        self.inner.allows_weak.store(allows, Ordering::Release);
    }

    /// Installs (or clears) this class's method resolver.
    pub fn set_method_resolver(self, resolver: Option<MethodResolver>) {
        *write(&self.inner.resolver) = resolver;
    }

    /// Nearest resolver in the class chain.
    pub(crate) fn method_resolver(self) -> Option<MethodResolver> {
        self.chain().find_map(|class| *read(&class.inner.resolver))
    }

    /// Returns `true` once `initialize` has run for this class.
    #[must_use]
    pub fn is_initialized(self) -> bool {
        self.instance_class().inner.init.done.load(Ordering::Acquire)
    }

    /// Runs `initialize` for this class and its superclasses if it has not
    /// run yet.
    ///
    /// Blocks while another thread is initializing the class; the
    /// initializing thread itself passes straight through.
    pub(crate) fn ensure_initialized(self) {
        let class = self.instance_class();
        if class.inner.init.done.load(Ordering::Acquire) {
            return;
        }
        class.initialize_slow();
    }

    fn initialize_slow(self) {
        if let Some(superclass) = self.superclass() {
            superclass.ensure_initialized();
        }

        let init = &self.inner.init;
        let current = thread::current().id();
        let mut phase = init.phase();
        loop {
            match *phase {
                InitPhase::Done => return,
                InitPhase::Running(owner) if owner == current => return,
                InitPhase::Running(_) => {
                    phase = init
                        .finished
                        .wait(phase)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                InitPhase::Pending => break,
            }
        }
        *phase = InitPhase::Running(current);
        drop(phase);

        let _finish = InitFinish(self);
        let selector = initialize_selector();
        if let Some(method) = self.metaclass().own_method(selector) {
            oxiobj_log::debug!("sending +{selector} to {}", self.name());
            (method.implementation())(self.id(), selector, &[]);
        }
    }

    /// Declares that this class adopts `protocol`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolAlreadyAdopted`] if this class already
    /// lists `protocol`.
    pub fn add_protocol(self, protocol: Protocol) -> Result<()> {
        let class = self.instance_class();
        let mut protocols = write(&class.inner.protocols);
        if protocols.contains(&protocol) {
            return Err(Error::ProtocolAlreadyAdopted {
                adopter: class.name().to_string(),
                protocol: protocol.name().to_string(),
            });
        }
        protocols.push(protocol);
        Ok(())
    }

    /// Protocols adopted by this class and its superclasses.
    #[must_use]
    pub fn protocols(self) -> Vec<Protocol> {
        let mut all: Vec<Protocol> = Vec::new();
        for class in self.instance_class().chain() {
            for protocol in read(&class.inner.protocols).iter() {
                if !all.contains(protocol) {
                    all.push(*protocol);
                }
            }
        }
        all
    }

    /// Returns `true` if this class or a superclass adopts a protocol that
    /// conforms to `protocol`.
    #[must_use]
    pub fn conforms_to(self, protocol: Protocol) -> bool {
        self.instance_class().chain().any(|class| {
            read(&class.inner.protocols)
                .iter()
                .any(|adopted| adopted.conforms_to(protocol))
        })
    }

    /// Checks that instances implement every required method of
    /// `protocol`, including those it inherits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingProtocolMethod`] for the first required
    /// selector the class chain does not implement.
    pub fn validate_protocol_conformance(self, protocol: Protocol) -> Result<()> {
        let class = self.instance_class();
        match protocol
            .all_required()
            .into_iter()
            .find(|selector| class.instance_method(*selector).is_none())
        {
            Some(selector) => Err(Error::MissingProtocolMethod {
                protocol: protocol.name().to_string(),
                selector: selector.name().to_string(),
            }),
            None => Ok(()),
        }
    }

    pub(crate) fn as_ptr(self) -> *mut ClassInner {
        ptr::from_ref(self.inner).cast_mut()
    }

    /// # Safety
    ///
    /// `ptr` must come from [`Class::as_ptr`].
    pub(crate) unsafe fn from_ptr(ptr: *mut ClassInner) -> Class {
        Class {
            // SAFETY: descriptors live in the arena for the whole program.
            inner: unsafe { &*ptr },
        }
    }
}

impl PartialEq for Class {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self.inner, other.inner)
    }
}

impl Eq for Class {}

impl Hash for Class {
    fn hash<H: Hasher>(&self, state: &mut H) {
        ptr::hash(self.inner, state);
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.inner.name)
            .field("meta", &self.is_meta_class())
            .field("superclass", &self.superclass().map(Class::name))
            .field("registered", &self.is_registered())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.inner.name)
    }
}
