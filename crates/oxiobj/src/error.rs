//! Error types for the `oxiobj` runtime.
//!
//! Two kinds of failure share this enum. Construction-time problems a
//! caller can act on (a class name already taken, an ivar added after
//! registration, a full tagged-pointer table) are returned as
//! `Err(Error)`. Invariant violations (double release, popping a foreign
//! pool, an unrecognized selector) are never returned: they are handed to
//! [`fatal`](crate::runtime::fatal::fatal), which logs and terminates.

use std::fmt;

/// Errors that can occur in the `oxiobj` runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An internal table or an instance could not be allocated.
    OutOfMemory,

    /// A class with this name is already registered or pending registration.
    ClassAlreadyExists {
        /// The contested class name.
        name: String,
    },

    /// No registered class has this name.
    ClassNotFound {
        /// The requested class name.
        name: String,
    },

    /// The class is registered and its layout can no longer change.
    ClassAlreadyRegistered {
        /// Name of the class.
        name: String,
    },

    /// The class has not been registered yet.
    ClassNotRegistered {
        /// Name of the class.
        name: String,
    },

    /// An instance variable with this name already exists in the class chain.
    IvarAlreadyExists {
        /// Name of the instance variable.
        name: String,
    },

    /// Alignment is not a power of two or exceeds the object alignment.
    InvalidAlignment {
        /// The requested alignment.
        alignment: usize,
    },

    /// The object's storage cannot hold an instance of the requested class.
    IncompatibleClass {
        /// Name of the requested class.
        class: String,
    },

    /// Metaclasses have neither instances nor instance variables.
    MetaClassHasNoInstances {
        /// Name of the class the metaclass describes.
        name: String,
    },

    /// Selector names must be non-empty.
    InvalidSelectorName,

    /// No method, resolver or forward handler answered the message.
    UnrecognizedSelector {
        /// Class of the receiver.
        class: String,
        /// The selector that was sent.
        selector: String,
    },

    /// Forwarding recursed past the depth limit.
    ForwardingLoopDetected {
        /// The selector that was being forwarded.
        selector: String,
        /// Depth at which the loop was detected.
        depth: u32,
    },

    /// Retain would make the count collide with the constant sentinel.
    RefCountOverflow,

    /// Release of an object whose count is already zero.
    DoubleRelease {
        /// Address of the object.
        ptr: usize,
    },

    /// Retain of an object whose count already reached zero.
    ObjectDeallocated {
        /// Address of the object.
        ptr: usize,
    },

    /// An autorelease pool handle that is not live on the calling thread.
    InvalidPool {
        /// What was wrong with the handle.
        reason: &'static str,
    },

    /// A tagged pointer uses a tag index with no class bound to it.
    TaggedClassNotRegistered {
        /// The tag index.
        index: u8,
    },

    /// Tag index outside the tagged-pointer class table.
    InvalidTaggedPointerIndex {
        /// The tag index.
        index: u8,
    },

    /// Every tagged-pointer class slot is taken.
    TaggedPointerTableFull,

    /// The tagged-pointer class slot is already bound.
    TaggedPointerSlotTaken {
        /// The tag index.
        index: u8,
    },

    /// The tagged-pointer secret was already set or already used.
    TaggedPointerSecretLocked,

    /// A protocol with this name is already registered.
    ProtocolAlreadyExists {
        /// The contested protocol name.
        name: String,
    },

    /// The class or protocol already adopts the protocol.
    ProtocolAlreadyAdopted {
        /// Name of the adopting class or protocol.
        adopter: String,
        /// Name of the adopted protocol.
        protocol: String,
    },

    /// Adopting the protocol would make it conform to itself.
    CyclicProtocol {
        /// Name of the protocol being adopted.
        protocol: String,
    },

    /// The selector is already declared in this protocol's list.
    ProtocolMethodAlreadyDeclared {
        /// Name of the protocol.
        protocol: String,
        /// The duplicated selector.
        selector: String,
    },

    /// A required protocol method is not implemented by the class chain.
    MissingProtocolMethod {
        /// Name of the protocol.
        protocol: String,
        /// The unimplemented selector.
        selector: String,
    },

    /// Monitor exit by a thread that does not hold the monitor.
    SyncNotOwned,

    /// The runtime configuration was already installed or already read.
    ConfigAlreadyInitialized,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfMemory => write!(f, "Out of memory"),
            Error::ClassAlreadyExists { name } => {
                write!(f, "Class '{name}' already exists")
            }
            Error::ClassNotFound { name } => {
                write!(f, "Class '{name}' not found")
            }
            Error::ClassAlreadyRegistered { name } => {
                write!(f, "Class '{name}' is already registered")
            }
            Error::ClassNotRegistered { name } => {
                write!(f, "Class '{name}' is not registered")
            }
            Error::IvarAlreadyExists { name } => {
                write!(f, "Instance variable '{name}' already exists")
            }
            Error::InvalidAlignment { alignment } => {
                write!(f, "Invalid alignment: {alignment}")
            }
            Error::IncompatibleClass { class } => {
                write!(f, "Object storage is too small for class '{class}'")
            }
            Error::MetaClassHasNoInstances { name } => {
                write!(f, "Metaclass of '{name}' has no instances")
            }
            Error::InvalidSelectorName => {
                write!(f, "Selector names must not be empty")
            }
            Error::UnrecognizedSelector { class, selector } => {
                write!(
                    f,
                    "Unrecognized selector '{selector}' sent to instance of '{class}'"
                )
            }
            Error::ForwardingLoopDetected { selector, depth } => {
                write!(
                    f,
                    "Forwarding loop detected for selector '{selector}' at depth {depth}"
                )
            }
            Error::RefCountOverflow => {
                write!(f, "Reference count overflow detected")
            }
            Error::DoubleRelease { ptr } => {
                write!(f, "Double release of object {ptr:#x}")
            }
            Error::ObjectDeallocated { ptr } => {
                write!(f, "Retain of deallocated object {ptr:#x}")
            }
            Error::InvalidPool { reason } => {
                write!(f, "Invalid autorelease pool: {reason}")
            }
            Error::TaggedClassNotRegistered { index } => {
                write!(f, "No class registered for tagged pointer index {index}")
            }
            Error::InvalidTaggedPointerIndex { index } => {
                write!(f, "Invalid tagged pointer index {index}")
            }
            Error::TaggedPointerTableFull => {
                write!(f, "Tagged pointer class table is full")
            }
            Error::TaggedPointerSlotTaken { index } => {
                write!(f, "Tagged pointer index {index} is already bound")
            }
            Error::TaggedPointerSecretLocked => {
                write!(f, "Tagged pointer secret can no longer be changed")
            }
            Error::ProtocolAlreadyExists { name } => {
                write!(f, "Protocol '{name}' already exists")
            }
            Error::ProtocolAlreadyAdopted { adopter, protocol } => {
                write!(f, "'{adopter}' already adopts protocol '{protocol}'")
            }
            Error::CyclicProtocol { protocol } => {
                write!(f, "Adopting protocol '{protocol}' would create a cycle")
            }
            Error::ProtocolMethodAlreadyDeclared { protocol, selector } => {
                write!(
                    f,
                    "Selector '{selector}' is already declared in protocol '{protocol}'"
                )
            }
            Error::MissingProtocolMethod { protocol, selector } => {
                write!(
                    f,
                    "Required method '{selector}' of protocol '{protocol}' is not implemented"
                )
            }
            Error::SyncNotOwned => {
                write!(f, "Monitor is not held by the calling thread")
            }
            Error::ConfigAlreadyInitialized => {
                write!(f, "Runtime configuration is already initialized")
            }
        }
    }
}

impl std::error::Error for Error {}

/// Result type for `oxiobj` runtime operations.
pub type Result<T> = std::result::Result<T, Error>;
