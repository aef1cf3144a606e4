//! Protocols: named sets of method declarations classes can adopt.
//!
//! Protocols are registered globally by name and live for the rest of the
//! process. A protocol may name a base protocol and adopt further protocols;
//! conformance follows both edges.
//!
//! Protocols do not take part in dispatch. Adopting one is declarative, and
//! [`Class::validate_protocol_conformance`](crate::runtime::Class::validate_protocol_conformance)
//! checks the required methods on demand.
//!
//! # Example
//!
//! ```rust
//! use oxiobj::runtime::{Protocol, Selector, allocate_class_pair};
//!
//! let copying = Protocol::new("ProtocolDocCopying", None).unwrap();
//! copying.add_required(Selector::register("copy").unwrap(), "@@:").unwrap();
//!
//! let class = allocate_class_pair(None, "ProtocolDocExample", 0).unwrap();
//! class.add_protocol(copying).unwrap();
//! assert!(class.conforms_to(copying));
//! assert!(class.validate_protocol_conformance(copying).is_err());
//! ```

use crate::error::{Error, Result};
use crate::runtime::config;
use crate::runtime::fatal::unwrap_or_fatal;
use crate::runtime::hashtable::{Hashtable, hash_str};
use crate::runtime::selector::Selector;
use oxiobj_mem::metadata_arena;
use std::fmt;
use std::ptr;
use std::sync::{OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Clone, Copy)]
struct ProtocolMethod {
    selector: Selector,
    types: &'static str,
}

pub(crate) struct ProtocolInner {
    name: &'static str,
    base: Option<Protocol>,
    adopted: RwLock<Vec<Protocol>>,
    required: RwLock<Vec<ProtocolMethod>>,
    optional: RwLock<Vec<ProtocolMethod>>,
}

/// A registered protocol.
///
/// `Protocol` is `Copy` and compares by identity.
#[derive(Clone, Copy)]
pub struct Protocol {
    inner: &'static ProtocolInner,
}

type ProtocolTable = Hashtable<&'static str, Protocol>;

static PROTOCOLS: OnceLock<RwLock<ProtocolTable>> = OnceLock::new();

fn protocols() -> &'static RwLock<ProtocolTable> {
    PROTOCOLS.get_or_init(|| {
        let table = Hashtable::with_capacity(
            |name: &&'static str| hash_str(name),
            |a, b| a == b,
            config::config().table_capacity,
        );
        RwLock::new(unwrap_or_fatal(table))
    })
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl Protocol {
    /// Registers a protocol named `name`, optionally refining `base`.
    ///
    /// # Errors
    ///
    /// - [`Error::ProtocolAlreadyExists`]: the name is taken.
    /// - [`Error::OutOfMemory`]: the record could not be allocated.
    pub fn new(name: &str, base: Option<Protocol>) -> Result<Protocol> {
        let mut table = write(protocols());
        if table.find(hash_str(name), |k| *k == name).is_some() {
            return Err(Error::ProtocolAlreadyExists {
                name: name.to_string(),
            });
        }

        let arena = metadata_arena();
        let name = arena.try_alloc_str(name).map_err(|_| Error::OutOfMemory)?;
        let inner = arena
            .try_alloc(ProtocolInner {
                name,
                base,
                adopted: RwLock::new(Vec::new()),
                required: RwLock::new(Vec::new()),
                optional: RwLock::new(Vec::new()),
            })
            .map_err(|_| Error::OutOfMemory)?;
        let protocol = Protocol { inner };
        table.try_set(name, protocol)?;

        oxiobj_log::debug!(
            "registered protocol {name} (base: {})",
            base.map_or("<none>", Protocol::name)
        );
        Ok(protocol)
    }

    /// The protocol registered as `name`.
    #[must_use]
    pub fn lookup(name: &str) -> Option<Protocol> {
        read(protocols())
            .find(hash_str(name), |k| *k == name)
            .copied()
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        self.inner.name
    }

    #[must_use]
    pub fn base_protocol(self) -> Option<Protocol> {
        self.inner.base
    }

    /// Protocols adopted directly, excluding the base protocol.
    #[must_use]
    pub fn adopted_protocols(self) -> Vec<Protocol> {
        read(&self.inner.adopted).clone()
    }

    fn declared(self, selector: Selector) -> bool {
        let matches = |method: &ProtocolMethod| method.selector == selector;
        read(&self.inner.required).iter().any(matches)
            || read(&self.inner.optional).iter().any(matches)
    }

    fn declare(
        self,
        list: &RwLock<Vec<ProtocolMethod>>,
        selector: Selector,
        types: &str,
    ) -> Result<()> {
        if self.declared(selector) {
            return Err(Error::ProtocolMethodAlreadyDeclared {
                protocol: self.name().to_string(),
                selector: selector.name().to_string(),
            });
        }
        let types = metadata_arena()
            .try_alloc_str(types)
            .map_err(|_| Error::OutOfMemory)?;
        write(list).push(ProtocolMethod { selector, types });
        Ok(())
    }

    /// Declares a method conforming classes must implement.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtocolMethodAlreadyDeclared`] if this protocol
    /// already declares `selector`, as required or optional.
    pub fn add_required(self, selector: Selector, types: &str) -> Result<()> {
        self.declare(&self.inner.required, selector, types)
    }

    /// Declares a method conforming classes may implement.
    ///
    /// # Errors
    ///
    /// See [`Protocol::add_required`].
    pub fn add_optional(self, selector: Selector, types: &str) -> Result<()> {
        self.declare(&self.inner.optional, selector, types)
    }

    /// Adopts `other`, so that anything conforming to `self` also conforms
    /// to `other`.
    ///
    /// # Errors
    ///
    /// - [`Error::ProtocolAlreadyAdopted`]: `other` is already adopted.
    /// - [`Error::CyclicProtocol`]: `other` already conforms to `self`.
    pub fn adopt(self, other: Protocol) -> Result<()> {
        if other.conforms_to(self) {
            return Err(Error::CyclicProtocol {
                protocol: other.name().to_string(),
            });
        }

        let mut adopted = write(&self.inner.adopted);
        if adopted.contains(&other) {
            return Err(Error::ProtocolAlreadyAdopted {
                adopter: self.name().to_string(),
                protocol: other.name().to_string(),
            });
        }
        adopted.push(other);
        Ok(())
    }

    /// Required selectors declared directly on this protocol.
    #[must_use]
    pub fn required(self) -> Vec<Selector> {
        read(&self.inner.required).iter().map(|m| m.selector).collect()
    }

    /// Optional selectors declared directly on this protocol.
    #[must_use]
    pub fn optional(self) -> Vec<Selector> {
        read(&self.inner.optional).iter().map(|m| m.selector).collect()
    }

    /// Type encoding declared for `selector` on this protocol.
    #[must_use]
    pub fn method_types(self, selector: Selector) -> Option<&'static str> {
        let find = |list: &RwLock<Vec<ProtocolMethod>>| {
            read(list)
                .iter()
                .find(|method| method.selector == selector)
                .map(|method| method.types)
        };
        find(&self.inner.required).or_else(|| find(&self.inner.optional))
    }

    /// Required selectors of this protocol, its base chain and everything
    /// they adopt, without duplicates.
    #[must_use]
    pub fn all_required(self) -> Vec<Selector> {
        let mut selectors = Vec::new();
        let mut visited = Vec::new();
        self.collect_required(&mut selectors, &mut visited);
        selectors
    }

    fn collect_required(self, selectors: &mut Vec<Selector>, visited: &mut Vec<Protocol>) {
        if visited.contains(&self) {
            return;
        }
        visited.push(self);

        for selector in self.required() {
            if !selectors.contains(&selector) {
                selectors.push(selector);
            }
        }
        if let Some(base) = self.base_protocol() {
            base.collect_required(selectors, visited);
        }
        for adopted in self.adopted_protocols() {
            adopted.collect_required(selectors, visited);
        }
    }

    /// Returns `true` if `self` is `other`, refines it, or adopts it,
    /// directly or transitively.
    #[must_use]
    pub fn conforms_to(self, other: Protocol) -> bool {
        if self.is_equal(other) {
            return true;
        }
        if self.base_protocol().is_some_and(|base| base.conforms_to(other)) {
            return true;
        }
        self.adopted_protocols()
            .into_iter()
            .any(|adopted| adopted.conforms_to(other))
    }

    /// Protocols are equal when their names are.
    #[must_use]
    pub fn is_equal(self, other: Protocol) -> bool {
        self == other || self.name() == other.name()
    }
}

impl PartialEq for Protocol {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self.inner, other.inner)
    }
}

impl Eq for Protocol {}

impl fmt::Debug for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Protocol")
            .field("name", &self.name())
            .field("base", &self.base_protocol().map(Protocol::name))
            .field("required", &read(&self.inner.required).len())
            .field("optional", &read(&self.inner.optional).len())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
