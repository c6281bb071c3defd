//! Package cache management.
//!
//! The cache is content-addressed: each package lives in the directory named
//! by its integrity string under the cache root, so two entries with the same
//! digest share one cache slot regardless of name or URL.

use async_trait::async_trait;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Package cache layout.
#[derive(Debug, Clone)]
pub struct PackageCache {
    /// Root directory for the package cache.
    root: PathBuf,
}

impl PackageCache {
    /// Create a cache rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Get the cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the directory holding the extracted package with this integrity.
    ///
    /// `integrity` must satisfy [`PackageCache::is_valid_key`]; the planner
    /// rejects entries that do not.
    #[must_use]
    pub fn entry_dir(&self, integrity: &str) -> PathBuf {
        self.root.join(integrity)
    }

    /// Whether `integrity` names a slot strictly inside the cache root.
    ///
    /// Base64 digests may contain `/`, which nests the slot, but every part
    /// must be a plain name: no root, drive prefix, `.` or `..`.
    #[must_use]
    pub fn is_valid_key(integrity: &str) -> bool {
        !integrity.is_empty()
            && Path::new(integrity)
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
    }
}

/// Filesystem operations used while installing.
///
/// Abstracted so the install decision procedure can be exercised without
/// touching disk.
#[async_trait]
pub trait Filesystem: Send + Sync {
    /// Whether `path` exists and is a directory. A missing path is `Ok(false)`.
    async fn is_dir(&self, path: &Path) -> io::Result<bool>;

    /// Create `path` and any missing parents.
    async fn make_dir_recursive(&self, path: &Path) -> io::Result<()>;

    /// Copy the contents of `src` into `dst`, merging with existing content.
    async fn copy_recursive(&self, src: &Path, dst: &Path) -> io::Result<()>;
}

/// [`Filesystem`] backed by the local disk, running on tokio's blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

async fn blocking<T, F>(f: F) -> io::Result<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(io::Error::other)?
}

#[async_trait]
impl Filesystem for LocalFs {
    async fn is_dir(&self, path: &Path) -> io::Result<bool> {
        let path = path.to_path_buf();
        blocking(move || qdd_util::fs::is_dir(&path)).await
    }

    async fn make_dir_recursive(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn copy_recursive(&self, src: &Path, dst: &Path) -> io::Result<()> {
        let (src, dst) = (src.to_path_buf(), dst.to_path_buf());
        blocking(move || qdd_util::fs::copy_dir_all(&src, &dst)).await
    }
}
