//! Executing a single install task.

use super::cache::Filesystem;
use super::error::PkgError;
use super::fetch::Fetcher;
use super::plan::InstallTask;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// How a task was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    /// Downloaded, with or without a cache slot.
    Fetched,
    /// Cache hit copied into `node_modules`.
    CopiedFromCache,
    /// Cache hit with no destination to write.
    AlreadyCached,
}

/// One async mutex per integrity string.
///
/// Holding the lock for a digest covers the cache probe and, on a miss, the
/// fetch that populates the slot. Later tasks for the same digest then see a
/// hit.
#[derive(Debug, Default)]
pub struct IntegrityLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl IntegrityLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock for `integrity`, created on first use.
    pub fn for_integrity(&self, integrity: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(integrity.to_string()).or_default())
    }
}

/// Resolve one task against the cache.
///
/// Without a cache slot the artifact is fetched straight into its
/// destination. With one, the slot is probed: a miss (or a failed probe)
/// fetches into both targets, a hit is copied to the destination if there is
/// one.
///
/// # Errors
/// Returns the fetch or copy error; nothing is retried.
pub async fn execute(
    task: &InstallTask,
    fetcher: &dyn Fetcher,
    fs: &dyn Filesystem,
    locks: &IntegrityLocks,
) -> Result<TaskOutcome, PkgError> {
    let dest_dir = task.dest_dir.as_deref();

    let Some(cache_dir) = task.cache_dir.as_deref() else {
        debug!(
            name = %task.name,
            integrity = %task.integrity,
            dest_dir = ?dest_dir,
            "Fetching without cache"
        );
        fetcher
            .fetch(&task.url, &task.integrity, None, dest_dir)
            .await?;
        return Ok(TaskOutcome::Fetched);
    };

    let slot = locks.for_integrity(&task.integrity);
    let guard = slot.lock().await;

    let hit = match fs.is_dir(cache_dir).await {
        Ok(hit) => hit,
        Err(e) => {
            debug!(
                name = %task.name,
                cache_dir = %cache_dir.display(),
                error = %e,
                "Cache probe failed, treating as miss"
            );
            false
        }
    };

    if !hit {
        debug!(
            name = %task.name,
            integrity = %task.integrity,
            cache_dir = %cache_dir.display(),
            dest_dir = ?dest_dir,
            "Cache miss"
        );
        fetcher
            .fetch(&task.url, &task.integrity, Some(cache_dir), dest_dir)
            .await?;
        return Ok(TaskOutcome::Fetched);
    }
    drop(guard);

    let Some(dest_dir) = dest_dir else {
        debug!(name = %task.name, integrity = %task.integrity, "Cache hit, nothing to write");
        return Ok(TaskOutcome::AlreadyCached);
    };

    debug!(
        name = %task.name,
        integrity = %task.integrity,
        cache_dir = %cache_dir.display(),
        dest_dir = %dest_dir.display(),
        "Cache hit, copying"
    );
    fs.copy_recursive(cache_dir, dest_dir).await.map_err(|e| {
        PkgError::node_modules_write_failed(format!(
            "Failed to copy {} to {}: {e}",
            cache_dir.display(),
            dest_dir.display()
        ))
    })?;

    Ok(TaskOutcome::CopiedFromCache)
}
