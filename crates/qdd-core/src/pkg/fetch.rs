//! Fetching verified package tarballs into the cache and `node_modules`.

use super::error::PkgError;
use super::integrity::Integrity;
use super::tarball::{
    check_size, download_tarball, extract_tgz_atomic, extract_tgz_merge, MAX_TARBALL_SIZE,
};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::trace;
use url::Url;

/// Downloads an artifact, verifies it, and writes it to its targets.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url`, check it against `integrity`, and materialize it into
    /// `cache_dir` and/or `dest_dir`.
    ///
    /// Nothing is written unless verification succeeds. With neither target
    /// set the artifact is verified and discarded.
    async fn fetch(
        &self,
        url: &str,
        integrity: &str,
        cache_dir: Option<&Path>,
        dest_dir: Option<&Path>,
    ) -> Result<(), PkgError>;
}

/// [`Fetcher`] for npm-style gzip'd tarballs over HTTP(S) or from `file:` URLs.
#[derive(Debug, Clone)]
pub struct TarballFetcher {
    http: Client,
    /// Base for relative `file:` URLs.
    project_root: PathBuf,
    max_bytes: u64,
}

impl TarballFetcher {
    /// Create a fetcher resolving relative `file:` URLs against `project_root`.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(project_root: impl Into<PathBuf>) -> Result<Self, PkgError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("qdd/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PkgError::download_failed(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            project_root: project_root.into(),
            max_bytes: MAX_TARBALL_SIZE,
        })
    }

    /// Override the maximum accepted tarball size.
    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Resolve a `file:` URL to a path.
    ///
    /// `file:///abs/pkg.tgz` is absolute; npm's `file:rel/pkg.tgz` is relative
    /// to the project root.
    fn local_path(&self, url: &str) -> Result<PathBuf, PkgError> {
        if url.starts_with("file://") {
            return Url::parse(url)
                .ok()
                .and_then(|u| u.to_file_path().ok())
                .ok_or_else(|| PkgError::download_failed(format!("Invalid file URL '{url}'")));
        }

        let rel = url.trim_start_matches("file:");
        Ok(self.project_root.join(rel))
    }

    async fn read_source(&self, url: &str) -> Result<Bytes, PkgError> {
        if url.starts_with("file:") {
            let path = self.local_path(url)?;
            let data = tokio::fs::read(&path).await.map_err(|e| {
                PkgError::download_failed(format!("Failed to read '{}': {e}", path.display()))
            })?;
            check_size(data.len() as u64, self.max_bytes)?;
            return Ok(Bytes::from(data));
        }

        download_tarball(&self.http, url, self.max_bytes).await
    }
}

#[async_trait]
impl Fetcher for TarballFetcher {
    async fn fetch(
        &self,
        url: &str,
        integrity: &str,
        cache_dir: Option<&Path>,
        dest_dir: Option<&Path>,
    ) -> Result<(), PkgError> {
        let expected: Integrity = integrity.parse()?;

        let bytes = self.read_source(url).await?;
        trace!(url = %url, size = bytes.len(), "Fetched tarball");

        expected.verify(&bytes)?;

        let cache_dir = cache_dir.map(Path::to_path_buf);
        let dest_dir = dest_dir.map(Path::to_path_buf);

        tokio::task::spawn_blocking(move || {
            write_targets(&bytes, cache_dir.as_deref(), dest_dir.as_deref())
        })
        .await
        .map_err(|e| PkgError::extract_failed(format!("Extraction task failed: {e}")))?
    }
}

/// Write verified tarball bytes to whichever targets are set.
///
/// With a cache slot, the destination is copied from it rather than
/// extracted a second time.
fn write_targets(
    bytes: &[u8],
    cache_dir: Option<&Path>,
    dest_dir: Option<&Path>,
) -> Result<(), PkgError> {
    match (cache_dir, dest_dir) {
        (Some(cache), dest) => {
            extract_tgz_atomic(bytes, cache)?;
            if let Some(dest) = dest {
                qdd_util::fs::copy_dir_all(cache, dest).map_err(|e| {
                    PkgError::node_modules_write_failed(format!(
                        "Failed to copy {} to {}: {e}",
                        cache.display(),
                        dest.display()
                    ))
                })?;
            }
            Ok(())
        }
        (None, Some(dest)) => extract_tgz_merge(bytes, dest),
        (None, None) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::error::codes;
    use crate::pkg::integrity::Algorithm;
    use crate::pkg::tarball::tests::tgz;
    use std::fs;
    use tempfile::tempdir;

    fn write_package(dir: &Path, file: &str) -> (String, String) {
        let bytes = tgz(&[
            ("package/package.json", r#"{"name":"pkg","version":"1.0.0"}"#),
            ("package/index.js", "module.exports = 'pkg';"),
        ]);
        fs::write(dir.join(file), &bytes).unwrap();
        let integrity = Integrity::compute(Algorithm::Sha512, &bytes).to_string();
        (format!("file:{file}"), integrity)
    }

    #[tokio::test]
    async fn test_fetch_to_cache_and_dest() {
        let dir = tempdir().unwrap();
        let (url, integrity) = write_package(dir.path(), "pkg.tgz");
        let fetcher = TarballFetcher::new(dir.path()).unwrap();

        let cache = dir.path().join("cache").join(&integrity);
        let dest = dir.path().join("node_modules").join("pkg");
        fetcher
            .fetch(&url, &integrity, Some(&cache), Some(&dest))
            .await
            .unwrap();

        assert!(cache.join("package.json").exists());
        assert!(dest.join("index.js").exists());
    }

    #[tokio::test]
    async fn test_fetch_dest_only() {
        let dir = tempdir().unwrap();
        let (url, integrity) = write_package(dir.path(), "pkg.tgz");
        let fetcher = TarballFetcher::new(dir.path()).unwrap();

        let dest = dir.path().join("node_modules").join("pkg");
        fetcher.fetch(&url, &integrity, None, Some(&dest)).await.unwrap();

        assert!(dest.join("package.json").exists());
    }

    #[tokio::test]
    async fn test_fetch_absolute_file_url() {
        let dir = tempdir().unwrap();
        let (_, integrity) = write_package(dir.path(), "pkg.tgz");
        let url = Url::from_file_path(dir.path().join("pkg.tgz")).unwrap();
        let fetcher = TarballFetcher::new("/nonexistent").unwrap();

        let dest = dir.path().join("out");
        fetcher
            .fetch(url.as_str(), &integrity, None, Some(&dest))
            .await
            .unwrap();
        assert!(dest.join("index.js").exists());
    }

    #[tokio::test]
    async fn test_integrity_mismatch_writes_nothing() {
        let dir = tempdir().unwrap();
        let (url, _) = write_package(dir.path(), "pkg.tgz");
        let wrong = Integrity::compute(Algorithm::Sha512, b"something else").to_string();
        let fetcher = TarballFetcher::new(dir.path()).unwrap();

        let cache = dir.path().join("cache").join("slot");
        let dest = dir.path().join("node_modules").join("pkg");
        let err = fetcher
            .fetch(&url, &wrong, Some(&cache), Some(&dest))
            .await
            .unwrap_err();

        assert_eq!(err.code(), codes::PKG_INTEGRITY_MISMATCH);
        assert!(!cache.exists());
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempdir().unwrap();
        let fetcher = TarballFetcher::new(dir.path()).unwrap();
        let err = fetcher
            .fetch("file:missing.tgz", "sha1-AAAA", None, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::PKG_DOWNLOAD_FAILED);
    }

    #[tokio::test]
    async fn test_size_limit() {
        let dir = tempdir().unwrap();
        let (url, integrity) = write_package(dir.path(), "pkg.tgz");
        let fetcher = TarballFetcher::new(dir.path()).unwrap().with_max_bytes(8);

        let err = fetcher.fetch(&url, &integrity, None, None).await.unwrap_err();
        assert_eq!(err.code(), codes::PKG_DOWNLOAD_FAILED);
    }
}
