//! `oxiobj` runtime module.
//!
//! # Architecture
//!
//! - [`hashtable`]: open-addressing table used by every runtime index
//! - [`selector`]: interned message names
//! - [`class`]: class and metaclass descriptors, method records, ivar
//!   layout and `initialize`
//! - [`protocol`]: protocol declarations and conformance
//! - [`registry`]: two-step class creation and lookup by name
//! - [`cache`]: per-class dispatch cache and the global dispatch epoch
//! - [`dispatch`]: message lookup and sending
//! - [`forwarding`]: method resolvers, the forward handler and loop detection
//! - [`object`]: object allocation, reference counting and teardown
//! - [`pool`]: thread-local autorelease pools
//! - [`weak`]: zeroing weak references
//! - [`sync`]: per-object monitors and atomic property accessors
//! - [`tagged`]: values encoded in the receiver word
//! - [`config`] and [`fatal`]: runtime settings and the fatal-error path
//!
//! Class descriptors, method records and selectors are allocated from the
//! `oxiobj-mem` metadata arena and live for the rest of the process.

pub mod cache;
pub mod class;
pub mod config;
pub mod dispatch;
pub mod fatal;
pub mod forwarding;
pub mod hashtable;
pub mod object;
pub mod pool;
pub mod protocol;
pub mod registry;
pub mod selector;
pub mod sync;
pub mod tagged;
pub mod weak;

pub use class::{Class, Imp, Ivar, Method, MethodResolver};
pub use config::RuntimeConfig;
pub use dispatch::{lookup, lookup_super, msg_send};
pub use fatal::fatal;
pub use forwarding::{ForwardHandler, set_forward_handler};
pub use hashtable::Hashtable;
pub use object::{
    Id, Object, ObjectPtr, autorelease_return_value, get_ivar, object_class_name,
    object_get_class, object_set_class, release, retain, retain_autorelease,
    retain_autorelease_return_value, retain_autoreleased_return_value, retain_count,
    set_ivar, store_strong,
};
pub use pool::{
    AutoreleasePool, PoolHandle, autorelease, autoreleasepool, pop_pool, push_pool,
};
pub use protocol::Protocol;
pub use registry::{
    all_classes, allocate_class_pair, allocate_class_pair_in, get_required_class,
    lookup_class, register_class_pair,
};
pub use selector::Selector;
pub use sync::{
    PropertyCopy, get_property, set_property, sync_enter, sync_exit, synchronized,
};
pub use tagged::{
    TaggedPointer, is_tagged_pointer, register_tagged_pointer_class,
    register_tagged_pointer_class_at, set_tagged_pointer_secret,
};
pub use weak::{
    Weak, WeakSlot, copy_weak, destroy_weak, init_weak, load_weak, move_weak,
    store_weak, weak_reference_count,
};
