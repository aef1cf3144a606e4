//! Tagged pointers: small values encoded directly in the receiver word.
//!
//! ```text
//!  usize::BITS-1                 4 3     1 0
//! +-------------------------------+-------+-+
//! |            payload            |  tag  |1|
//! +-------------------------------+-------+-+
//! ```
//!
//! Bit 0 is always set, which no aligned heap object address has. Bits
//! 1..=3 select one of [`MAX_TAGGED_CLASSES`] classes; the payload keeps the
//! remaining [`PAYLOAD_BITS`] bits, and wider values are silently
//! truncated. The whole word is XORed with a process-wide secret (low bit
//! cleared), which can be set once with [`set_tagged_pointer_secret`]
//! before the first tagged pointer is made.
//!
//! Tagged pointers are never allocated, retained, released or registered
//! in the weak table.

use crate::error::{Error, Result};
use crate::runtime::class::{Class, ClassInner};
use crate::runtime::object::Id;
use std::fmt;
use std::num::NonZeroUsize;
use std::ptr;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicPtr, Ordering};

/// Number of tag bits.
pub const TAG_BITS: u32 = 3;

/// Number of classes that can be bound to tags.
pub const MAX_TAGGED_CLASSES: usize = 1 << TAG_BITS;

const MARKER: usize = 1;
const SHIFT: u32 = TAG_BITS + 1;
const TAG_MASK: usize = (MAX_TAGGED_CLASSES - 1) << 1;

/// Number of payload bits a tagged pointer keeps.
pub const PAYLOAD_BITS: u32 = usize::BITS - SHIFT;

static SECRET: OnceLock<usize> = OnceLock::new();

static CLASSES: [AtomicPtr<ClassInner>; MAX_TAGGED_CLASSES] =
    [const { AtomicPtr::new(ptr::null_mut()) }; MAX_TAGGED_CLASSES];

fn secret() -> usize {
    *SECRET.get_or_init(|| 0)
}

/// Sets the XOR secret applied to every tagged pointer word.
///
/// The low bit of `secret` is ignored so encoded words keep their marker.
///
/// # Errors
///
/// Returns [`Error::TaggedPointerSecretLocked`] if a secret was already set
/// or a tagged pointer was already created or inspected.
pub fn set_tagged_pointer_secret(secret: usize) -> Result<()> {
    SECRET
        .set(secret & !MARKER)
        .map_err(|_| Error::TaggedPointerSecretLocked)
}

/// A value encoded in a pointer-sized word.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaggedPointer(NonZeroUsize);

impl TaggedPointer {
    /// Encodes `payload` under tag `index`.
    ///
    /// Returns `None` if `index` is not below [`MAX_TAGGED_CLASSES`]. Payload
    /// bits above [`PAYLOAD_BITS`] are dropped.
    #[must_use]
    pub fn new(index: u8, payload: usize) -> Option<Self> {
        if usize::from(index) >= MAX_TAGGED_CLASSES {
            return None;
        }

        let raw = (payload << SHIFT) | (usize::from(index) << 1) | MARKER;
        NonZeroUsize::new(raw ^ secret()).map(TaggedPointer)
    }

    /// Reinterprets an encoded word; `None` if the marker bit is clear.
    #[must_use]
    pub fn from_word(word: usize) -> Option<Self> {
        if word & MARKER == 0 {
            return None;
        }
        NonZeroUsize::new(word).map(TaggedPointer)
    }

    /// The encoded word.
    #[must_use]
    pub fn word(self) -> usize {
        self.0.get()
    }

    fn decoded(self) -> usize {
        self.0.get() ^ secret()
    }

    /// Tag index.
    #[must_use]
    pub fn index(self) -> u8 {
        // TAG_MASK keeps three bits, so the value fits in a u8.
        ((self.decoded() & TAG_MASK) >> 1) as u8
    }

    /// Payload, zero-extended to `usize`.
    #[must_use]
    pub fn value(self) -> usize {
        self.decoded() >> SHIFT
    }

    /// Payload sign-extended from [`PAYLOAD_BITS`].
    #[must_use]
    pub fn signed_value(self) -> isize {
        (self.decoded() as isize) >> SHIFT
    }

    /// Class bound to this pointer's tag, if any.
    #[must_use]
    pub fn class(self) -> Option<Class> {
        tagged_pointer_class(self.index())
    }
}

impl fmt::Debug for TaggedPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaggedPointer")
            .field("index", &self.index())
            .field("value", &self.value())
            .finish()
    }
}

/// Returns `true` if `id` is a tagged pointer rather than a heap object.
#[must_use]
pub fn is_tagged_pointer(id: Id) -> bool {
    id.is_tagged()
}

/// Binds `class` to the lowest free tag and returns the tag.
///
/// # Errors
///
/// - [`Error::ClassNotRegistered`]: `class` is not registered.
/// - [`Error::TaggedPointerTableFull`]: every tag is bound.
pub fn register_tagged_pointer_class(class: Class) -> Result<u8> {
    ensure_registered(class)?;

    for (index, entry) in CLASSES.iter().enumerate() {
        if entry
            .compare_exchange(
                ptr::null_mut(),
                class.as_ptr(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            oxiobj_log::debug!("tagged pointer index {index} bound to {}", class.name());
            // MAX_TAGGED_CLASSES is 8.
            return Ok(index as u8);
        }
    }

    Err(Error::TaggedPointerTableFull)
}

/// Binds `class` to tag `index`.
///
/// # Errors
///
/// - [`Error::InvalidTaggedPointerIndex`]: `index` is out of range.
/// - [`Error::ClassNotRegistered`]: `class` is not registered.
/// - [`Error::TaggedPointerSlotTaken`]: the tag is already bound.
pub fn register_tagged_pointer_class_at(index: u8, class: Class) -> Result<()> {
    let entry = CLASSES
        .get(usize::from(index))
        .ok_or(Error::InvalidTaggedPointerIndex { index })?;
    ensure_registered(class)?;

    entry
        .compare_exchange(
            ptr::null_mut(),
            class.as_ptr(),
            Ordering::AcqRel,
            Ordering::Acquire,
        )
        .map_err(|_| Error::TaggedPointerSlotTaken { index })?;

    oxiobj_log::debug!("tagged pointer index {index} bound to {}", class.name());
    Ok(())
}

fn ensure_registered(class: Class) -> Result<()> {
    if class.is_registered() {
        Ok(())
    } else {
        Err(Error::ClassNotRegistered {
            name: class.name().to_string(),
        })
    }
}

/// Class bound to tag `index`, if any.
#[must_use]
pub fn tagged_pointer_class(index: u8) -> Option<Class> {
    let raw = CLASSES.get(usize::from(index))?.load(Ordering::Acquire);
    // SAFETY: the table only holds registered descriptors.
    (!raw.is_null()).then(|| unsafe { Class::from_ptr(raw) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let tagged = TaggedPointer::new(5, 123_456).unwrap();
        assert_eq!(tagged.index(), 5);
        assert_eq!(tagged.value(), 123_456);
        assert_eq!(tagged.word() & 1, 1);
    }

    #[test]
    fn test_invalid_index() {
        assert!(TaggedPointer::new(8, 1).is_none());
        assert!(TaggedPointer::new(u8::MAX, 1).is_none());
    }

    #[test]
    fn test_payload_is_truncated() {
        let tagged = TaggedPointer::new(1, usize::MAX).unwrap();
        assert_eq!(tagged.value(), usize::MAX >> SHIFT);
        assert_eq!(tagged.index(), 1);
        assert_eq!(tagged.signed_value(), -1);
    }

    #[test]
    fn test_from_word() {
        let tagged = TaggedPointer::new(3, 7).unwrap();
        assert_eq!(TaggedPointer::from_word(tagged.word()), Some(tagged));
        assert_eq!(TaggedPointer::from_word(0x1000), None);
    }

    #[test]
    fn test_is_tagged_pointer() {
        let tagged = TaggedPointer::new(2, 5).unwrap();
        assert!(is_tagged_pointer(Id::from(tagged)));
    }

    #[test]
    fn test_class_lookup_out_of_range() {
        assert_eq!(tagged_pointer_class(MAX_TAGGED_CLASSES as u8), None);
    }
}
