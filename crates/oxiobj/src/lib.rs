//! `oxiobj`: a reference-counted dynamic object runtime.
//!
//! `oxiobj` provides the core of a message-passing object system:
//!
//! - **Classes** created and extended at runtime, looked up by name
//! - **Dynamic Dispatch** by selector, with a per-class cache and forwarding
//! - **Reference Counting** with nested, thread-local autorelease pools
//! - **Weak References** that read as nil once their target is freed
//! - **Tagged Pointers** carrying small values in the receiver word
//!
//! # Example
//!
//! ```rust
//! use oxiobj::{Id, Object, Selector, Weak, allocate_class_pair, register_class_pair};
//!
//! fn area(_receiver: Id, _selector: Selector, args: &[usize]) -> usize {
//!     args[0] * args[1]
//! }
//!
//! let class = allocate_class_pair(None, "Rectangle", 0).unwrap();
//! let selector = Selector::register("areaWithWidth:height:").unwrap();
//! class.add_method(selector, area, "Q@:QQ");
//! register_class_pair(class);
//!
//! let rect = Object::new(class).unwrap();
//! assert_eq!(rect.send(selector, &[3, 4]), 12);
//!
//! let weak = Weak::new(&rect);
//! assert!(weak.load().is_some());
//! drop(rect);
//! assert!(weak.load().is_none());
//! ```

pub mod error;
pub mod runtime;

// Re-export commonly used types
pub use error::{Error, Result};
pub use runtime::{
    AutoreleasePool, Class, Id, Imp, Ivar, Method, Object, Protocol, Selector, TaggedPointer,
    Weak,
    allocate_class_pair, autoreleasepool, lookup_class, msg_send, register_class_pair,
};
