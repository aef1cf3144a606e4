//! Handling of messages no class in the receiver's chain implements.
//!
//! When dispatch misses, resolution goes through two hooks in order:
//!
//! 1. The nearest [`MethodResolver`](crate::runtime::class::MethodResolver)
//!    in the receiver's class chain. If it reports that it installed a
//!    method, the lookup is retried once.
//! 2. The process-wide [`ForwardHandler`], which may return any
//!    implementation to run in place of the missing one.
//!
//! If neither produces an implementation the send is fatal with
//! [`Error::UnrecognizedSelector`].
//!
//! Hooks may send messages themselves, including ones that miss again.
//! Nesting is counted per thread and more than [`MAX_FORWARDING_DEPTH`]
//! nested resolutions is fatal with [`Error::ForwardingLoopDetected`].

use crate::error::Error;
use crate::runtime::class::{Class, Imp};
use crate::runtime::fatal::fatal;
use crate::runtime::object::Id;
use crate::runtime::selector::Selector;
use std::cell::Cell;
use std::sync::{PoisonError, RwLock};

/// Global fallback for unrecognized selectors.
///
/// Returns the implementation to run for `selector` on `receiver`, or
/// `None` to let the send fail.
pub type ForwardHandler = fn(receiver: Id, selector: Selector) -> Option<Imp>;

/// Maximum number of nested forwarding resolutions on one thread.
pub const MAX_FORWARDING_DEPTH: u32 = 32;

// ============================================================================
// Loop Detection
// ============================================================================

thread_local! {
    static FORWARDING_DEPTH: Cell<u32> = const { Cell::new(0) };
}

struct DepthGuard;

impl DepthGuard {
    fn enter(selector: Selector) -> DepthGuard {
        let depth = FORWARDING_DEPTH.with(|depth| {
            let current = depth.get() + 1;
            depth.set(current);
            current
        });

        if depth > MAX_FORWARDING_DEPTH {
            // The guard is not built yet, so undo the increment by hand.
            FORWARDING_DEPTH.with(|d| d.set(d.get() - 1));
            fatal(Error::ForwardingLoopDetected {
                selector: selector.name().to_string(),
                depth,
            });
        }
        DepthGuard
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        FORWARDING_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Current forwarding nesting on this thread.
#[must_use]
pub fn forwarding_depth() -> u32 {
    FORWARDING_DEPTH.with(Cell::get)
}

// ============================================================================
// Global Handler
// ============================================================================

static FORWARD_HANDLER: RwLock<Option<ForwardHandler>> = RwLock::new(None);

/// Installs the global forward handler, returning the previous one.
///
/// Passing `None` removes it.
pub fn set_forward_handler(handler: Option<ForwardHandler>) -> Option<ForwardHandler> {
    let mut slot = FORWARD_HANDLER
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    std::mem::replace(&mut *slot, handler)
}

/// The installed global forward handler.
#[must_use]
pub fn forward_handler() -> Option<ForwardHandler> {
    *FORWARD_HANDLER.read().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Resolution
// ============================================================================

/// Finds an implementation for a selector `class` does not implement.
///
/// Never returns on failure.
pub(crate) fn resolve_missing(receiver: Id, class: Class, selector: Selector) -> Imp {
    let _guard = DepthGuard::enter(selector);

    oxiobj_log::debug!(
        "{} does not implement {}; trying resolver and forward handler (depth {})",
        class.name(),
        selector,
        forwarding_depth()
    );

    if let Some(resolver) = class.method_resolver()
        && resolver(class, selector)
        && let Some(imp) = class.method_implementation(selector)
    {
        oxiobj_log::debug!("resolver installed {} on {}", selector, class.name());
        return imp;
    }

    if let Some(handler) = forward_handler()
        && let Some(imp) = handler(receiver, selector)
    {
        oxiobj_log::debug!("forward handler took {} for {}", selector, class.name());
        return imp;
    }

    fatal(Error::UnrecognizedSelector {
        class: class.name().to_string(),
        selector: selector.name().to_string(),
    })
}
