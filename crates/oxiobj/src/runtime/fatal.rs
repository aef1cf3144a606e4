//! Termination path for invariant violations.
//!
//! Nothing the runtime detects at this level can be handed back to the
//! caller: a double release or a message nobody answers means the object
//! graph is already wrong. [`fatal`] logs the violation and then either
//! panics (the default, so a hosted program or a test harness can unwind
//! to its top-level handler) or aborts when
//! [`RuntimeConfig::abort_on_fatal`](super::config::RuntimeConfig) is set.

use crate::error::Error;
use crate::runtime::config;

/// Logs `error` and terminates the current operation.
///
/// The panic payload is the error's `Display` text, so tests can match it
/// with `#[should_panic(expected = "...")]`.
#[cold]
#[inline(never)]
#[track_caller]
pub fn fatal(error: Error) -> ! {
    oxiobj_log::error!("{error}");

    #[cfg(feature = "fatal_backtrace")]
    {
        let backtrace = backtrace::Backtrace::new();
        oxiobj_log::error!("{backtrace:?}");
    }

    if config::config().abort_on_fatal {
        std::process::abort();
    }

    panic!("{error}");
}

/// Unwraps `result`, routing errors to [`fatal`].
#[track_caller]
pub(crate) fn unwrap_or_fatal<T>(result: crate::Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(error) => fatal(error),
    }
}
