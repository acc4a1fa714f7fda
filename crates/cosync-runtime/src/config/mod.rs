//! Runtime configuration
//!
//! Library defaults with environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder calls
//! 2. Environment variables
//! 3. [`defaults`]
//!
//! ```rust,ignore
//! use cosync_runtime::config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env()
//!     .num_workers(2)
//!     .park_timeout(Duration::from_millis(1));
//! config.validate()?;
//! ```

pub mod defaults;

use std::time::Duration;
use cosync_core::constants::MAX_WORKERS;
use cosync_core::env::{env_get, env_get_bool, env_parse, EnvParseError};
use cosync_core::kprintln;

/// Environment variable names
pub mod keys {
    pub const NUM_WORKERS: &str = "COSYNC_NUM_WORKERS";
    pub const MAX_COROUTINES: &str = "COSYNC_MAX_COROUTINES";
    pub const IDLE_SPINS: &str = "COSYNC_IDLE_SPINS";
    pub const PARK_TIMEOUT_MS: &str = "COSYNC_PARK_TIMEOUT_MS";
    pub const DEBUG: &str = "COSYNC_DEBUG";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Worker threads started by `Executor::start`
    pub num_workers: usize,
    /// Record arena capacity; bounds live coroutines
    pub max_coroutines: usize,
    /// Empty polls before a worker parks
    pub idle_spins: u32,
    /// Longest single park
    pub park_timeout: Duration,
    /// Raise the log level to debug
    pub debug_logging: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl RuntimeConfig {
    /// Defaults with environment overrides; malformed values are ignored
    ///
    /// - `COSYNC_NUM_WORKERS`
    /// - `COSYNC_MAX_COROUTINES`
    /// - `COSYNC_IDLE_SPINS`
    /// - `COSYNC_PARK_TIMEOUT_MS`
    /// - `COSYNC_DEBUG` (0/1)
    pub fn from_env() -> Self {
        Self {
            num_workers: env_get(keys::NUM_WORKERS, defaults::NUM_WORKERS),
            max_coroutines: env_get(keys::MAX_COROUTINES, defaults::MAX_COROUTINES),
            idle_spins: env_get(keys::IDLE_SPINS, defaults::IDLE_SPINS),
            park_timeout: Duration::from_millis(env_get(
                keys::PARK_TIMEOUT_MS,
                defaults::PARK_TIMEOUT_MS,
            )),
            debug_logging: env_get_bool(keys::DEBUG, defaults::DEBUG_LOGGING),
        }
    }

    /// Like [`from_env`](Self::from_env), but a set-and-malformed variable is an error
    pub fn try_from_env() -> Result<Self, ConfigError> {
        let mut config = Self::new();
        if let Some(n) = env_parse(keys::NUM_WORKERS)? {
            config.num_workers = n;
        }
        if let Some(n) = env_parse(keys::MAX_COROUTINES)? {
            config.max_coroutines = n;
        }
        if let Some(n) = env_parse(keys::IDLE_SPINS)? {
            config.idle_spins = n;
        }
        if let Some(ms) = env_parse(keys::PARK_TIMEOUT_MS)? {
            config.park_timeout = Duration::from_millis(ms);
        }
        config.debug_logging = env_get_bool(keys::DEBUG, config.debug_logging);
        Ok(config)
    }

    /// Library defaults only, no environment
    pub fn new() -> Self {
        Self {
            num_workers: defaults::NUM_WORKERS,
            max_coroutines: defaults::MAX_COROUTINES,
            idle_spins: defaults::IDLE_SPINS,
            park_timeout: Duration::from_millis(defaults::PARK_TIMEOUT_MS),
            debug_logging: defaults::DEBUG_LOGGING,
        }
    }

    // Builder methods

    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    pub fn max_coroutines(mut self, n: usize) -> Self {
        self.max_coroutines = n;
        self
    }

    pub fn idle_spins(mut self, spins: u32) -> Self {
        self.idle_spins = spins;
        self
    }

    pub fn park_timeout(mut self, d: Duration) -> Self {
        self.park_timeout = d;
        self
    }

    pub fn debug_logging(mut self, enable: bool) -> Self {
        self.debug_logging = enable;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_workers == 0 {
            return Err(ConfigError::InvalidValue("num_workers must be > 0"));
        }
        if self.num_workers > MAX_WORKERS {
            return Err(ConfigError::InvalidValue("num_workers must be <= 64"));
        }
        if self.max_coroutines == 0 {
            return Err(ConfigError::InvalidValue("max_coroutines must be > 0"));
        }
        if self.max_coroutines >= u32::MAX as usize {
            return Err(ConfigError::InvalidValue("max_coroutines must fit a u32 id"));
        }
        if self.park_timeout.is_zero() {
            return Err(ConfigError::InvalidValue("park_timeout must be > 0"));
        }
        Ok(())
    }

    pub fn print(&self) {
        kprintln!("cosync configuration:");
        kprintln!("  num_workers:     {}", self.num_workers);
        kprintln!("  max_coroutines:  {}", self.max_coroutines);
        kprintln!("  idle_spins:      {}", self.idle_spins);
        kprintln!("  park_timeout:    {:?}", self.park_timeout);
        kprintln!("  debug_logging:   {}", self.debug_logging);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue(&'static str),
    MalformedEnv(EnvParseError),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "invalid config: {}", msg),
            ConfigError::MalformedEnv(e) => write!(f, "invalid config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<EnvParseError> for ConfigError {
    fn from(e: EnvParseError) -> Self {
        ConfigError::MalformedEnv(e)
    }
}
