//! Runtime configuration.
//!
//! The configuration is read once, on first use, from the environment
//! unless [`init`] installed one explicitly before that.
//!
//! | Variable | Effect |
//! |---|---|
//! | `OXIOBJ_LOG` | log level (`error`, `warn`, `info`, `debug`, `trace`) |
//! | `OXIOBJ_ABORT_ON_FATAL` | `1`/`true`: abort instead of panicking on invariant violations |
//! | `OXIOBJ_CLASS_TABLE_CAPACITY` | initial capacity of the class and selector tables |

use crate::error::{Error, Result};
use oxiobj_log::Level;
use std::sync::OnceLock;

/// Environment variable selecting abort-on-fatal.
pub const ABORT_ON_FATAL_ENV_VAR: &str = "OXIOBJ_ABORT_ON_FATAL";

/// Environment variable overriding the initial registry capacity.
pub const TABLE_CAPACITY_ENV_VAR: &str = "OXIOBJ_CLASS_TABLE_CAPACITY";

const DEFAULT_TABLE_CAPACITY: usize = 64;

/// Process-wide runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Log level applied when the configuration is installed.
    pub log_level: Option<Level>,
    /// Abort the process on invariant violations instead of panicking.
    pub abort_on_fatal: bool,
    /// Initial capacity of the class and selector name tables.
    pub table_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            log_level: None,
            abort_on_fatal: false,
            table_capacity: DEFAULT_TABLE_CAPACITY,
        }
    }
}

impl RuntimeConfig {
    /// Builds a configuration from the process environment.
    ///
    /// Unset or unparseable variables keep their defaults. The log level is
    /// read, and applied, by [`oxiobj_log::init_from_env`].
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::from_lookup(|key| std::env::var(key).ok());
        config.log_level = oxiobj_log::init_from_env();
        config
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = RuntimeConfig::default();

        if let Some(flag) = lookup(ABORT_ON_FATAL_ENV_VAR) {
            config.abort_on_fatal = parse_flag(&flag);
        }

        if let Some(capacity) = lookup(TABLE_CAPACITY_ENV_VAR)
            && let Ok(capacity) = capacity.trim().parse::<usize>()
            && capacity > 0
        {
            config.table_capacity = capacity;
        }

        config
    }

    fn apply(&self) {
        if let Some(level) = self.log_level {
            oxiobj_log::set_level(level);
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

static CONFIG: OnceLock<RuntimeConfig> = OnceLock::new();

/// Installs `config` as the runtime configuration.
///
/// # Errors
///
/// Returns [`Error::ConfigAlreadyInitialized`] if a configuration was
/// already installed or already read by the runtime.
pub fn init(config: RuntimeConfig) -> Result<()> {
    let mut installed = false;
    CONFIG.get_or_init(|| {
        installed = true;
        config.apply();
        config
    });

    if installed {
        Ok(())
    } else {
        Err(Error::ConfigAlreadyInitialized)
    }
}

/// Returns the active configuration, reading the environment on first use.
pub fn config() -> &'static RuntimeConfig {
    CONFIG.get_or_init(|| {
        let config = RuntimeConfig::from_env();
        config.apply();
        config
    })
}
