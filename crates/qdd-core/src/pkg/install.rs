//! Running a planned install.
//!
//! Tasks are admitted through a semaphore sized by the configured
//! concurrency and driven together on the current task. The first real
//! failure stops admission: tasks already running finish, tasks still
//! waiting resolve as cancelled, and every failure is reported at the end.

use super::cache::Filesystem;
use super::error::PkgError;
use super::fetch::Fetcher;
use super::plan::InstallTask;
use super::task::{execute, IntegrityLocks, TaskOutcome};
use crate::config::Config;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Counts for a finished install.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallSummary {
    pub total: usize,
    /// Tasks that downloaded their artifact.
    pub fetched: usize,
    /// Tasks served from the cache.
    pub cache_hits: usize,
    /// Tasks with no `node_modules` destination.
    pub skipped_dest: usize,
}

impl InstallSummary {
    fn record(&mut self, task: &InstallTask, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::Fetched => self.fetched += 1,
            TaskOutcome::CopiedFromCache | TaskOutcome::AlreadyCached => self.cache_hits += 1,
        }
        if task.dest_dir.is_none() {
            self.skipped_dest += 1;
        }
    }
}

/// A task that failed.
#[derive(Debug, Clone)]
pub struct TaskFailure {
    pub name: String,
    pub error: PkgError,
}

/// Why an install did not complete.
#[derive(Debug, Clone)]
pub enum InstallFailure {
    /// The cache root could not be created; no task ran.
    CacheRoot(PkgError),
    /// One or more tasks failed.
    Tasks {
        failures: Vec<TaskFailure>,
        /// Tasks never started because of an earlier failure.
        cancelled: usize,
    },
}

impl InstallFailure {
    /// Every underlying error, in completion order.
    #[must_use]
    pub fn errors(&self) -> Vec<&PkgError> {
        match self {
            Self::CacheRoot(e) => vec![e],
            Self::Tasks { failures, .. } => failures.iter().map(|f| &f.error).collect(),
        }
    }
}

impl fmt::Display for InstallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CacheRoot(e) => write!(f, "{e}"),
            Self::Tasks {
                failures,
                cancelled,
            } => {
                write!(f, "{} package(s) failed to install", failures.len())?;
                if *cancelled > 0 {
                    write!(f, ", {cancelled} cancelled")?;
                }
                for failure in failures {
                    write!(f, "\n  {}: {}", failure.name, failure.error)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for InstallFailure {}

/// Drives install tasks with bounded concurrency.
pub struct Installer {
    fetcher: Arc<dyn Fetcher>,
    fs: Arc<dyn Filesystem>,
    concurrency: usize,
    cache_root: Option<PathBuf>,
}

impl Installer {
    #[must_use]
    pub fn new(fetcher: Arc<dyn Fetcher>, fs: Arc<dyn Filesystem>) -> Self {
        Self {
            fetcher,
            fs,
            concurrency: crate::config::DEFAULT_CONCURRENCY,
            cache_root: None,
        }
    }

    /// Installer using the concurrency and cache root of `config`.
    #[must_use]
    pub fn from_config(config: &Config, fetcher: Arc<dyn Fetcher>, fs: Arc<dyn Filesystem>) -> Self {
        let cache_root = config.use_cache().then(|| config.cache_dir.clone());
        Self::new(fetcher, fs)
            .with_concurrency(config.concurrency)
            .with_cache_root(cache_root)
    }

    /// Maximum tasks in flight. Zero is treated as one.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Cache root created before any task runs.
    #[must_use]
    pub fn with_cache_root(mut self, cache_root: Option<PathBuf>) -> Self {
        self.cache_root = cache_root;
        self
    }

    /// Run every task.
    ///
    /// # Errors
    /// Returns [`InstallFailure::CacheRoot`] if the cache root cannot be
    /// created, or [`InstallFailure::Tasks`] with every task failure.
    pub async fn run(&self, tasks: &[InstallTask]) -> Result<InstallSummary, InstallFailure> {
        if let Some(root) = &self.cache_root {
            self.fs.make_dir_recursive(root).await.map_err(|e| {
                InstallFailure::CacheRoot(PkgError::cache_error(format!(
                    "Failed to create cache directory {}: {e}",
                    root.display()
                )))
            })?;
        }

        debug!(
            tasks = tasks.len(),
            concurrency = self.concurrency,
            "Starting install"
        );

        let semaphore = Semaphore::new(self.concurrency);
        let locks = IntegrityLocks::new();
        let aborted = AtomicBool::new(false);

        let (semaphore, locks, aborted) = (&semaphore, &locks, &aborted);
        let (fetcher, fs) = (&*self.fetcher, &*self.fs);

        let mut pending: FuturesUnordered<_> = tasks
            .iter()
            .map(move |task| async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return (task, Err(PkgError::cancelled(&task.name)));
                };
                if aborted.load(Ordering::SeqCst) {
                    return (task, Err(PkgError::cancelled(&task.name)));
                }

                let result = execute(task, fetcher, fs, locks).await;
                if result.is_err() {
                    aborted.store(true, Ordering::SeqCst);
                }
                (task, result)
            })
            .collect();

        let mut summary = InstallSummary {
            total: tasks.len(),
            ..Default::default()
        };
        let mut failures = Vec::new();
        let mut cancelled = 0;

        while let Some((task, result)) = pending.next().await {
            match result {
                Ok(outcome) => summary.record(task, outcome),
                Err(e) if e.is_cancelled() => cancelled += 1,
                Err(error) => {
                    warn!(name = %task.name, error = %error, "Install task failed");
                    failures.push(TaskFailure {
                        name: task.name.clone(),
                        error,
                    });
                }
            }
        }

        if !failures.is_empty() {
            return Err(InstallFailure::Tasks {
                failures,
                cancelled,
            });
        }

        info!(
            total = summary.total,
            fetched = summary.fetched,
            cache_hits = summary.cache_hits,
            "Install complete"
        );
        Ok(summary)
    }
}
