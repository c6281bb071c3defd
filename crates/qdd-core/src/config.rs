use crate::error::Error;
use crate::paths::default_cache_dir;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default number of install tasks allowed in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Environment variables consulted by [`Config::resolve`].
pub mod env {
    pub const CACHE: &str = "QDD_CACHE";
    pub const DEBUG: &str = "QDD_DEBUG";
    pub const CONCURRENCY: &str = "QDD_CONCURRENCY";
    pub const PROD: &str = "QDD_PROD";
    pub const PRODUCTION: &str = "QDD_PRODUCTION";
    pub const NOCACHE: &str = "QDD_NOCACHE";
    pub const CACHEONLY: &str = "QDD_CACHEONLY";
    pub const NODE_ENV: &str = "NODE_ENV";
}

/// Settings given explicitly on the command line.
///
/// Flags win over the environment; unset flags fall through to it.
#[derive(Debug, Clone, Default)]
pub struct ConfigFlags {
    pub cache_dir: Option<PathBuf>,
    pub debug: bool,
    pub concurrency: Option<usize>,
    pub production: bool,
    pub no_cache: bool,
    pub cache_only: bool,
}

/// Resolved runtime configuration for an install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Project directory holding the lock file and receiving `node_modules`.
    pub cwd: PathBuf,

    /// Root of the content-addressed package cache.
    pub cache_dir: PathBuf,

    /// Emit per-task debug logging.
    pub debug: bool,

    /// Maximum number of install tasks in flight.
    pub concurrency: usize,

    /// Skip development-only dependencies.
    pub production: bool,

    /// Bypass the cache entirely.
    pub no_cache: bool,

    /// Only warm the cache; write nothing under `node_modules`.
    pub cache_only: bool,

    /// Whether to emit JSON logs.
    pub json_logs: bool,

    /// Verbosity level (0 = INFO, 1 = DEBUG, 2+ = TRACE).
    pub verbosity: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            cache_dir: default_cache_dir(),
            debug: false,
            concurrency: DEFAULT_CONCURRENCY,
            production: false,
            no_cache: false,
            cache_only: false,
            json_logs: false,
            verbosity: 0,
        }
    }
}

impl Config {
    /// Create a new config with the given working directory.
    #[must_use]
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            ..Default::default()
        }
    }

    /// Resolve configuration from command-line flags and an environment lookup.
    ///
    /// `lookup` returns the value of an environment variable, if set. Boolean
    /// variables count as enabled when set to any non-empty value.
    pub fn resolve<F>(cwd: PathBuf, flags: &ConfigFlags, lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let enabled = |key: &str| lookup(key).is_some_and(|v| !v.is_empty());

        let cache_dir = flags
            .cache_dir
            .clone()
            .or_else(|| lookup(env::CACHE).filter(|v| !v.is_empty()).map(PathBuf::from))
            .unwrap_or_else(default_cache_dir);

        let concurrency = match flags.concurrency {
            Some(n) => n,
            None => match lookup(env::CONCURRENCY).filter(|v| !v.is_empty()) {
                Some(raw) => raw
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| Error::InvalidConcurrency { value: raw })?,
                None => DEFAULT_CONCURRENCY,
            },
        };
        if concurrency == 0 {
            return Err(Error::InvalidConcurrency {
                value: concurrency.to_string(),
            });
        }

        let production = flags.production
            || enabled(env::PROD)
            || enabled(env::PRODUCTION)
            || matches!(
                lookup(env::NODE_ENV).as_deref(),
                Some("prod" | "production")
            );

        let config = Self {
            cwd,
            cache_dir,
            debug: flags.debug || enabled(env::DEBUG),
            concurrency,
            production,
            no_cache: flags.no_cache || enabled(env::NOCACHE),
            cache_only: flags.cache_only || enabled(env::CACHEONLY),
            json_logs: false,
            verbosity: 0,
        };

        if config.cache_only && config.no_cache {
            return Err(Error::ConflictingModes);
        }

        Ok(config)
    }

    /// Resolve configuration from flags and the process environment.
    pub fn from_env(cwd: PathBuf, flags: &ConfigFlags) -> Result<Self, Error> {
        Self::resolve(cwd, flags, |key| std::env::var(key).ok())
    }

    /// Whether install tasks read from and populate the cache.
    #[must_use]
    pub fn use_cache(&self) -> bool {
        !self.no_cache
    }

    /// Whether install tasks write into `node_modules`.
    #[must_use]
    pub fn use_dest(&self) -> bool {
        !self.cache_only
    }

    /// Set verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set JSON log output.
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }

    /// Set the cache root.
    #[must_use]
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    /// Set production filtering.
    #[must_use]
    pub fn with_production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    /// Set cache bypass.
    #[must_use]
    pub fn with_no_cache(mut self, no_cache: bool) -> Self {
        self.no_cache = no_cache;
        self
    }

    /// Set cache-only mode.
    #[must_use]
    pub fn with_cache_only(mut self, cache_only: bool) -> Self {
        self.cache_only = cache_only;
        self
    }

    /// Set the in-flight task limit.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }
}
