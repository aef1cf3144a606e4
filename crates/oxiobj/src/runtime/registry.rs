//! Global class registry.
//!
//! Classes are created in two steps. [`allocate_class_pair`] reserves the
//! name and returns an unregistered [`Class`] whose layout can still grow;
//! [`register_class_pair`] publishes it by name and freezes the layout.
//!
//! A reserved name stays reserved even if the pair is never registered, so
//! two builders cannot race to the same name.

use crate::error::{Error, Result};
use crate::runtime::class::{Class, align_up};
use crate::runtime::config;
use crate::runtime::fatal::{fatal, unwrap_or_fatal};
use crate::runtime::hashtable::{Hashtable, hash_str};
use crate::runtime::object::HEADER_SIZE;
use std::sync::{OnceLock, PoisonError, RwLock};

/// Module name recorded by [`allocate_class_pair`].
pub const DEFAULT_MODULE: &str = "main";

type NameTable = Hashtable<&'static str, Class>;

struct Registry {
    classes: NameTable,
    pending: NameTable,
}

static REGISTRY: OnceLock<RwLock<Registry>> = OnceLock::new();

fn name_table(capacity: usize) -> Result<NameTable> {
    Hashtable::with_capacity(
        |name: &&'static str| hash_str(name),
        |a, b| a == b,
        capacity,
    )
}

fn registry() -> &'static RwLock<Registry> {
    REGISTRY.get_or_init(|| {
        let capacity = config::config().table_capacity;
        RwLock::new(Registry {
            classes: unwrap_or_fatal(name_table(capacity)),
            pending: unwrap_or_fatal(name_table(8)),
        })
    })
}

fn find(table: &NameTable, name: &str) -> Option<Class> {
    table.find(hash_str(name), |k| *k == name).copied()
}

/// Creates an unregistered class named `name`.
///
/// Instances are laid out as the superclass's instance (or the object
/// header for a root class) followed by `extra_bytes`, rounded up to
/// pointer size. Further instance variables go after that.
///
/// # Errors
///
/// - [`Error::ClassAlreadyExists`]: `name` is registered or reserved.
/// - [`Error::ClassNotRegistered`]: `superclass` is not registered yet.
/// - [`Error::MetaClassHasNoInstances`]: `superclass` is a metaclass.
/// - [`Error::OutOfMemory`]: the descriptor could not be allocated.
pub fn allocate_class_pair(
    superclass: Option<Class>,
    name: &str,
    extra_bytes: usize,
) -> Result<Class> {
    allocate_class_pair_in(DEFAULT_MODULE, superclass, name, extra_bytes)
}

/// Like [`allocate_class_pair`], recording `module` as the class's owner.
///
/// # Errors
///
/// See [`allocate_class_pair`].
pub fn allocate_class_pair_in(
    module: &str,
    superclass: Option<Class>,
    name: &str,
    extra_bytes: usize,
) -> Result<Class> {
    if let Some(superclass) = superclass
        && superclass.is_meta_class()
    {
        return Err(Error::MetaClassHasNoInstances {
            name: superclass.name().to_string(),
        });
    }
    if let Some(superclass) = superclass
        && !superclass.is_registered()
    {
        return Err(Error::ClassNotRegistered {
            name: superclass.name().to_string(),
        });
    }

    let base = superclass.map_or(HEADER_SIZE, Class::instance_size);
    let instance_size = base
        .checked_add(extra_bytes)
        .and_then(|size| align_up(size, size_of::<usize>()))
        .ok_or(Error::OutOfMemory)?;

    let mut registry = registry().write().unwrap_or_else(PoisonError::into_inner);
    if find(&registry.classes, name).is_some() || find(&registry.pending, name).is_some() {
        return Err(Error::ClassAlreadyExists {
            name: name.to_string(),
        });
    }

    let class = Class::allocate(module, name, superclass, instance_size)?;
    registry.pending.try_set(class.name(), class)?;

    oxiobj_log::debug!(
        "allocated class {name} (superclass: {}, instance size: {instance_size})",
        superclass.map_or("<root>", Class::name)
    );
    Ok(class)
}

/// Publishes `class` under its name and freezes its layout.
///
/// Passing a metaclass registers its class. Registering a class twice, or
/// registering a name another class already holds, is fatal.
pub fn register_class_pair(class: Class) {
    let class = class.instance_class();
    let mut registry = registry().write().unwrap_or_else(PoisonError::into_inner);

    if class.is_registered() {
        fatal(Error::ClassAlreadyRegistered {
            name: class.name().to_string(),
        });
    }
    if find(&registry.classes, class.name()).is_some() {
        fatal(Error::ClassAlreadyExists {
            name: class.name().to_string(),
        });
    }

    registry.classes.set(class.name(), class);
    if find(&registry.pending, class.name()) == Some(class) {
        registry.pending.delete(&class.name());
    }

    if !class.mark_registered() {
        fatal(Error::ClassAlreadyRegistered {
            name: class.name().to_string(),
        });
    }

    oxiobj_log::debug!(
        "registered class {} ({} bytes per instance)",
        class.name(),
        class.instance_size()
    );
}

/// Registered class named `name`.
#[must_use]
pub fn lookup_class(name: &str) -> Option<Class> {
    let registry = registry().read().unwrap_or_else(PoisonError::into_inner);
    find(&registry.classes, name).filter(|class| class.is_registered())
}

/// Registered class named `name`; a missing class is fatal.
pub fn get_required_class(name: &str) -> Class {
    lookup_class(name).unwrap_or_else(|| {
        fatal(Error::ClassNotFound {
            name: name.to_string(),
        })
    })
}

/// Every registered class, in no particular order.
#[must_use]
pub fn all_classes() -> Vec<Class> {
    let registry = registry().read().unwrap_or_else(PoisonError::into_inner);
    registry.classes.values().copied().collect()
}

/// Number of registered classes.
#[must_use]
pub fn class_count() -> usize {
    registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .classes
        .len()
}
