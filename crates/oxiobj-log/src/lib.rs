//! Leveled logging for the `oxiobj` runtime.
//!
//! The runtime sits underneath everything else in a process, so this crate
//! has no dependencies and never allocates unless a message is actually
//! emitted. Messages carry the module path of the call site and go to
//! standard error, or to a sink installed with [`set_sink`].
//!
//! # Example
//!
//! ```
//! use oxiobj_log::{debug, info, Level};
//!
//! oxiobj_log::set_level(Level::Debug);
//!
//! let class = "Counter";
//! info!("registered class {}", class);
//! debug!("instance size {}", 24);
//! ```

use std::fmt::{self, Arguments};
use std::str::FromStr;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU8, Ordering};

/// Environment variable consulted by [`init_from_env`].
pub const LOG_ENV_VAR: &str = "OXIOBJ_LOG";

/// Severity of a log message.
///
/// Lower numeric values are more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Invariant violations and other fatal conditions
    Error = 0,
    /// Suspicious but survivable situations
    Warn = 1,
    /// Lifecycle events
    Info = 2,
    /// Registry and forwarding details
    Debug = 3,
    /// Hot-path details (cache fills, method replacement)
    Trace = 4,
}

impl Level {
    const fn from_u8(value: u8) -> Level {
        match value {
            0 => Level::Error,
            1 => Level::Warn,
            2 => Level::Info,
            3 => Level::Debug,
            _ => Level::Trace,
        }
    }

    /// Returns the upper-case name of this level.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        }
    }

    const fn color_code(&self) -> &'static str {
        match self {
            Level::Error => "\x1b[31m",
            Level::Warn => "\x1b[33m",
            Level::Info => "\x1b[32m",
            Level::Debug => "\x1b[36m",
            Level::Trace => "\x1b[35m",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a log level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLevelError {
    input: String,
}

impl fmt::Display for ParseLevelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid log level: {}", self.input)
    }
}

impl std::error::Error for ParseLevelError {}

impl FromStr for Level {
    type Err = ParseLevelError;

    /// Parses a level name, ignoring case.
    ///
    /// ```
    /// use oxiobj_log::Level;
    ///
    /// assert_eq!("warn".parse::<Level>(), Ok(Level::Warn));
    /// assert!("loud".parse::<Level>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ERROR" => Ok(Level::Error),
            "WARN" | "WARNING" => Ok(Level::Warn),
            "INFO" => Ok(Level::Info),
            "DEBUG" => Ok(Level::Debug),
            "TRACE" => Ok(Level::Trace),
            _ => Err(ParseLevelError {
                input: s.to_string(),
            }),
        }
    }
}

/// A single log message handed to a sink.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    /// Severity of the message
    pub level: Level,
    /// Module path of the call site
    pub target: &'a str,
    /// Formatted message arguments
    pub args: Arguments<'a>,
}

/// Function receiving every enabled record instead of standard error.
pub type Sink = fn(&Record<'_>);

/// Process-wide logger state.
pub struct Logger {
    level: AtomicU8,
    sink: RwLock<Option<Sink>>,
}

impl Logger {
    const fn new(level: Level) -> Self {
        Logger {
            level: AtomicU8::new(level as u8),
            sink: RwLock::new(None),
        }
    }

    /// Sets the most verbose level that will be emitted.
    pub fn set_level(&self, level: Level) {
        self.level.store(level as u8, Ordering::Relaxed);
    }

    /// Returns the most verbose level that will be emitted.
    #[must_use]
    pub fn level(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Relaxed))
    }

    /// Returns whether a message at `level` would be emitted.
    #[inline]
    #[must_use]
    pub fn enabled(&self, level: Level) -> bool {
        level as u8 <= self.level.load(Ordering::Relaxed)
    }

    fn sink(&self) -> Option<Sink> {
        match self.sink.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn replace_sink(&self, sink: Option<Sink>) -> Option<Sink> {
        let mut guard = match self.sink.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, sink)
    }
}

// Warn by default: the runtime is quiet unless something looks wrong.
static LOGGER: Logger = Logger::new(Level::Warn);

/// Returns the global logger.
#[must_use]
pub fn logger() -> &'static Logger {
    &LOGGER
}

/// Sets the most verbose level the global logger emits.
pub fn set_level(level: Level) {
    LOGGER.set_level(level);
}

/// Sets the global level from a level name.
///
/// # Errors
///
/// Returns [`ParseLevelError`] if `s` does not name a level; the current
/// level is left unchanged.
pub fn set_level_from_str(s: &str) -> Result<(), ParseLevelError> {
    let level = s.parse()?;
    set_level(level);
    Ok(())
}

/// Reads [`LOG_ENV_VAR`] and applies it if it names a level.
///
/// Returns the level that was applied, if any. Unparseable values are
/// reported once through the logger itself and otherwise ignored.
pub fn init_from_env() -> Option<Level> {
    let value = std::env::var(LOG_ENV_VAR).ok()?;
    match value.parse::<Level>() {
        Ok(level) => {
            set_level(level);
            Some(level)
        }
        Err(err) => {
            __log(Level::Warn, module_path!(), format_args!("{LOG_ENV_VAR}: {err}"));
            None
        }
    }
}

/// Routes records to `sink` instead of standard error; `None` restores
/// standard error. Returns the previously installed sink.
pub fn set_sink(sink: Option<Sink>) -> Option<Sink> {
    LOGGER.replace_sink(sink)
}

#[doc(hidden)]
pub fn __log(level: Level, target: &str, args: Arguments<'_>) {
    if !LOGGER.enabled(level) {
        return;
    }

    let record = Record {
        level,
        target,
        args,
    };

    if let Some(sink) = LOGGER.sink() {
        sink(&record);
        return;
    }

    const RESET: &str = "\x1b[0m";
    eprintln!(
        "{}[{}]{RESET} {}: {}",
        level.color_code(),
        level.as_str(),
        record.target,
        record.args
    );
}

/// Logs at an explicit level.
///
/// ```
/// use oxiobj_log::{log, Level};
///
/// log!(level: Level::Error, "refcount underflow on {:#x}", 0x1000);
/// ```
#[macro_export]
macro_rules! log {
    (level: $level:expr, $($arg:tt)*) => {{
        let level = $level;
        if $crate::logger().enabled(level) {
            $crate::__log(level, module_path!(), format_args!($($arg)*));
        }
    }};
}

/// Logs at [`Level::Error`].
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => { $crate::log!(level: $crate::Level::Error, $($arg)*) };
}

/// Logs at [`Level::Warn`].
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => { $crate::log!(level: $crate::Level::Warn, $($arg)*) };
}

/// Logs at [`Level::Info`].
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => { $crate::log!(level: $crate::Level::Info, $($arg)*) };
}

/// Logs at [`Level::Debug`].
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => { $crate::log!(level: $crate::Level::Debug, $($arg)*) };
}

/// Logs at [`Level::Trace`].
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => { $crate::log!(level: $crate::Level::Trace, $($arg)*) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    // Tests in this module share the global logger.
    static SERIAL: Mutex<()> = Mutex::new(());
    static CAPTURED: AtomicUsize = AtomicUsize::new(0);

    fn counting_sink(record: &Record<'_>) {
        assert!(record.target.starts_with("oxiobj_log"));
        CAPTURED.fetch_add(1, Ordering::SeqCst);
    }

    fn serial() -> std::sync::MutexGuard<'static, ()> {
        SERIAL.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    #[test]
    fn test_level_ordering() {
        assert!(Level::Error < Level::Warn);
        assert!(Level::Warn < Level::Info);
        assert!(Level::Info < Level::Debug);
        assert!(Level::Debug < Level::Trace);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("error".parse::<Level>(), Ok(Level::Error));
        assert_eq!("Warning".parse::<Level>(), Ok(Level::Warn));
        assert_eq!(" info ".parse::<Level>(), Ok(Level::Info));
        assert_eq!("DEBUG".parse::<Level>(), Ok(Level::Debug));
        assert_eq!("trace".parse::<Level>(), Ok(Level::Trace));

        let err = "verbose".parse::<Level>().unwrap_err();
        assert_eq!(err.to_string(), "invalid log level: verbose");
    }

    #[test]
    fn test_level_display() {
        assert_eq!(Level::Warn.to_string(), "WARN");
        assert_eq!(Level::Trace.as_str(), "TRACE");
    }

    #[test]
    fn test_logger_filtering() {
        let logger = Logger::new(Level::Info);

        assert!(logger.enabled(Level::Error));
        assert!(logger.enabled(Level::Info));
        assert!(!logger.enabled(Level::Debug));

        logger.set_level(Level::Trace);
        assert!(logger.enabled(Level::Trace));
        assert_eq!(logger.level(), Level::Trace);
    }

    #[test]
    fn test_set_level_from_str_keeps_level_on_error() {
        let _guard = serial();

        set_level_from_str("debug").unwrap();
        assert_eq!(logger().level(), Level::Debug);

        assert!(set_level_from_str("nonsense").is_err());
        assert_eq!(logger().level(), Level::Debug);

        set_level(Level::Warn);
    }

    #[test]
    fn test_sink_receives_enabled_records_only() {
        let _guard = serial();

        set_level(Level::Info);
        let previous = set_sink(Some(counting_sink));
        CAPTURED.store(0, Ordering::SeqCst);

        info!("captured {}", 1);
        debug!("filtered {}", 2);
        error!("captured {}", 3);

        assert_eq!(CAPTURED.load(Ordering::SeqCst), 2);

        set_sink(previous);
        set_level(Level::Warn);
    }

    #[test]
    fn test_logging_from_many_threads() {
        let _guard = serial();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                std::thread::spawn(move || {
                    trace!("thread {i} trace");
                    warn!("thread {i} warning");
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
