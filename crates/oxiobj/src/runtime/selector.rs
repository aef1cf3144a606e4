//! `Selector` interning for the `oxiobj` runtime.
//!
//! Every distinct method name maps to exactly one [`Selector`], allocated in
//! the metadata arena and never freed. Two selectors are equal exactly when
//! they are the same interned record, so comparison is a pointer compare and
//! the hash is computed once at interning time.
//!
//! # Thread Safety
//!
//! The name table sits behind a single `RwLock`. Lookups of already-interned
//! names take the read lock; the first registration of a name takes the
//! write lock and re-checks before allocating, so racing registrations of
//! the same name agree on one record.

use crate::error::{Error, Result};
use crate::runtime::config;
use crate::runtime::fatal::unwrap_or_fatal;
use crate::runtime::hashtable::{Hashtable, hash_str};
use oxiobj_mem::metadata_arena;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::{OnceLock, RwLock};

pub(crate) struct SelectorInner {
    name: &'static str,
    hash: u32,
}

/// An interned method name.
///
/// `Selector` is `Copy` and compares by identity.
#[derive(Clone, Copy)]
pub struct Selector {
    inner: &'static SelectorInner,
}

type SelectorTable = Hashtable<&'static str, Selector>;

static SELECTORS: OnceLock<RwLock<SelectorTable>> = OnceLock::new();

fn selectors() -> &'static RwLock<SelectorTable> {
    SELECTORS.get_or_init(|| {
        let table = Hashtable::with_capacity(
            |name: &&'static str| hash_str(name),
            |a, b| a == b,
            config::config().table_capacity,
        );
        RwLock::new(unwrap_or_fatal(table))
    })
}

impl Selector {
    /// Interns `name`, returning its unique selector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSelectorName`] for an empty name.
    pub fn register(name: &str) -> Result<Selector> {
        if name.is_empty() {
            return Err(Error::InvalidSelectorName);
        }

        if let Some(selector) = Self::lookup(name) {
            return Ok(selector);
        }

        let mut table = selectors()
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(selector) = table.find(hash_str(name), |k| *k == name) {
            return Ok(*selector);
        }

        let arena = metadata_arena();
        let name = arena.try_alloc_str(name).map_err(|_| Error::OutOfMemory)?;
        let inner = arena
            .try_alloc(SelectorInner {
                name,
                hash: hash_str(name),
            })
            .map_err(|_| Error::OutOfMemory)?;
        let selector = Selector { inner };
        table.try_set(name, selector)?;

        oxiobj_log::trace!("interned selector '{name}'");
        Ok(selector)
    }

    /// Returns the selector for `name` if it has been interned.
    #[must_use]
    pub fn lookup(name: &str) -> Option<Selector> {
        let table = selectors()
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        table.find(hash_str(name), |k| *k == name).copied()
    }

    /// The selector's name.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.inner.name
    }

    /// Hash computed when the selector was interned.
    #[must_use]
    pub fn hash_value(self) -> u32 {
        self.inner.hash
    }

    pub(crate) fn as_ptr(self) -> *mut SelectorInner {
        std::ptr::from_ref(self.inner).cast_mut()
    }
}

/// Number of interned selectors.
#[must_use]
pub fn selector_count() -> usize {
    selectors()
        .read()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .len()
}

impl FromStr for Selector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Selector::register(s)
    }
}

impl PartialEq for Selector {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.inner, other.inner)
    }
}

impl Eq for Selector {}

impl Hash for Selector {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.inner.hash);
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Selector").field(&self.inner.name).finish()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.inner.name)
    }
}
