//! Package install functionality.
//!
//! Provides utilities for:
//! - Loading `package-lock.json` (or an in-line lock block)
//! - Planning install tasks from the lock tree
//! - Verifying Subresource Integrity strings
//! - Downloading and extracting tarballs
//! - Managing the content-addressed package cache
//! - Running tasks with bounded concurrency

pub mod cache;
pub mod error;
pub mod fetch;
pub mod install;
pub mod integrity;
pub mod lockfile;
pub mod plan;
pub mod tarball;
pub mod task;

#[cfg(test)]
mod fakes;

pub use cache::{Filesystem, LocalFs, PackageCache};
pub use error::{codes as pkg_codes, PkgError};
pub use fetch::{Fetcher, TarballFetcher};
pub use install::{InstallFailure, InstallSummary, Installer, TaskFailure};
pub use integrity::{Algorithm, Integrity};
pub use lockfile::{
    codes as lockfile_codes, DependencyEntry, LockNode, LockfileError, INLINE_LOCK_ENV,
    LOCKFILE_NAME,
};
pub use plan::{plan_install, InstallTask, InvalidEntryError, PlanOptions};
pub use task::{execute, IntegrityLocks, TaskOutcome};
