//! Message dispatch.
//!
//! [`lookup`] maps a receiver and selector to the implementation that
//! should run:
//!
//! 1. The receiver's class is found from its tag (tagged pointers), its
//!    header (heap objects) or its metaclass (classes). A class that has
//!    not yet been sent `initialize` is initialized first.
//! 2. The class's [`MethodCache`](crate::runtime::cache::MethodCache) is
//!    probed.
//! 3. On a miss the class chain is walked, most-derived first, and the hit
//!    is cached on the receiver's class.
//! 4. If nothing in the chain implements the selector, resolution moves to
//!    [`forwarding`](crate::runtime::forwarding).
//!
//! # Example
//!
//! ```rust
//! use oxiobj::runtime::{
//!     Id, Object, Selector, allocate_class_pair, msg_send, register_class_pair,
//! };
//!
//! fn answer(_receiver: Id, _selector: Selector, args: &[usize]) -> usize {
//!     42 + args.iter().sum::<usize>()
//! }
//!
//! let class = allocate_class_pair(None, "DispatchDocExample", 0).unwrap();
//! let selector = Selector::register("answer").unwrap();
//! class.add_method(selector, answer, "Q@:");
//! register_class_pair(class);
//!
//! let object = Object::new(class).unwrap();
//! assert_eq!(object.send(selector, &[]), 42);
//! assert_eq!(unsafe { msg_send(Some(object.id()), selector, &[1, 2]) }, 45);
//! assert_eq!(unsafe { msg_send(None, selector, &[]) }, 0);
//! ```

use crate::error::Error;
use crate::runtime::class::{Class, Imp, Method};
use crate::runtime::fatal::fatal;
use crate::runtime::forwarding;
use crate::runtime::object::{Id, Object, object_get_class};
use crate::runtime::selector::Selector;

/// Implementation `receiver` runs for `selector`.
///
/// An unrecognized selector is resolved through
/// [`forwarding`](crate::runtime::forwarding); if that fails the call is
/// fatal.
///
/// # Safety
///
/// `receiver` must refer to an object that has not been freed.
#[must_use]
pub unsafe fn lookup(receiver: Id, selector: Selector) -> Imp {
    // SAFETY: guaranteed by the caller.
    let class = unsafe { object_get_class(receiver) };
    class.ensure_initialized();
    match class.resolve(selector) {
        Some(method) => method.implementation(),
        None => forwarding::resolve_missing(receiver, class, selector),
    }
}

/// Implementation of `selector` as seen by a method defined on `class`
/// calling its superclass.
///
/// The search starts at `class`'s superclass and bypasses forwarding; a
/// miss is fatal.
#[must_use]
pub fn lookup_super(class: Class, selector: Selector) -> Imp {
    class
        .superclass()
        .and_then(|superclass| superclass.resolve(selector))
        .map(Method::implementation)
        .unwrap_or_else(|| {
            fatal(Error::UnrecognizedSelector {
                class: class
                    .superclass()
                    .map_or(class.name(), Class::name)
                    .to_string(),
                selector: selector.name().to_string(),
            })
        })
}

/// Sends `selector` to `receiver` with `args`.
///
/// Messages to nil return 0 without doing anything.
///
/// # Safety
///
/// `receiver`, if present, must refer to an object that has not been freed.
pub unsafe fn msg_send(receiver: Option<Id>, selector: Selector, args: &[usize]) -> usize {
    let Some(receiver) = receiver else {
        return 0;
    };
    // SAFETY: guaranteed by the caller.
    let imp = unsafe { lookup(receiver, selector) };
    imp(receiver, selector, args)
}

impl Class {
    /// Sends `selector` to this class, dispatching through its metaclass.
    pub fn send(self, selector: Selector, args: &[usize]) -> usize {
        // SAFETY: classes are never freed.
        unsafe { msg_send(Some(Id::Class(self)), selector, args) }
    }
}

impl Object {
    /// Sends `selector` to this object.
    pub fn send(&self, selector: Selector, args: &[usize]) -> usize {
        // SAFETY: `self` holds a reference, so the object is alive.
        unsafe { msg_send(Some(self.id()), selector, args) }
    }

    /// Returns `true` if this object's class chain implements `selector`.
    ///
    /// Method resolvers and the forward handler are not consulted.
    #[must_use]
    pub fn responds_to(&self, selector: Selector) -> bool {
        self.class().responds_to(selector)
    }
}
