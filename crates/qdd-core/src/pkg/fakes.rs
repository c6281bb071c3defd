//! In-memory [`Filesystem`] and recording [`Fetcher`] for tests.

use super::cache::Filesystem;
use super::error::PkgError;
use super::fetch::Fetcher;
use async_trait::async_trait;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Directory set with call logs.
#[derive(Debug, Default)]
pub(crate) struct MemFs {
    dirs: Mutex<HashSet<PathBuf>>,
    copies: Mutex<Vec<(PathBuf, PathBuf)>>,
    made: Mutex<Vec<PathBuf>>,
    probes: AtomicUsize,
    fail_probe: bool,
    fail_mkdir: bool,
    fail_copy: bool,
}

impl MemFs {
    /// Every `is_dir` call errors.
    pub(crate) fn failing_probe(mut self) -> Self {
        self.fail_probe = true;
        self
    }

    /// Every `make_dir_recursive` call errors.
    pub(crate) fn failing_mkdir(mut self) -> Self {
        self.fail_mkdir = true;
        self
    }

    /// Every `copy_recursive` call errors.
    pub(crate) fn failing_copy(mut self) -> Self {
        self.fail_copy = true;
        self
    }

    pub(crate) fn add_dir(&self, path: impl Into<PathBuf>) {
        self.dirs.lock().unwrap().insert(path.into());
    }

    pub(crate) fn has_dir(&self, path: &Path) -> bool {
        self.dirs.lock().unwrap().contains(path)
    }

    pub(crate) fn copies(&self) -> Vec<(PathBuf, PathBuf)> {
        self.copies.lock().unwrap().clone()
    }

    pub(crate) fn made(&self) -> Vec<PathBuf> {
        self.made.lock().unwrap().clone()
    }

    pub(crate) fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Filesystem for MemFs {
    async fn is_dir(&self, path: &Path) -> io::Result<bool> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.fail_probe {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "probe denied"));
        }
        Ok(self.has_dir(path))
    }

    async fn make_dir_recursive(&self, path: &Path) -> io::Result<()> {
        if self.fail_mkdir {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "mkdir denied"));
        }
        self.made.lock().unwrap().push(path.to_path_buf());
        self.add_dir(path);
        Ok(())
    }

    async fn copy_recursive(&self, src: &Path, dst: &Path) -> io::Result<()> {
        if self.fail_copy {
            return Err(io::Error::other("disk full"));
        }
        self.copies
            .lock()
            .unwrap()
            .push((src.to_path_buf(), dst.to_path_buf()));
        self.add_dir(dst);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FetchCall {
    pub(crate) url: String,
    pub(crate) integrity: String,
    pub(crate) cache_dir: Option<PathBuf>,
    pub(crate) dest_dir: Option<PathBuf>,
}

/// Records every fetch and marks its targets as present in a [`MemFs`].
#[derive(Debug)]
pub(crate) struct RecordingFetcher {
    fs: Arc<MemFs>,
    calls: Mutex<Vec<FetchCall>>,
    failing: HashSet<String>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingFetcher {
    pub(crate) fn new(fs: Arc<MemFs>) -> Self {
        Self {
            fs,
            calls: Mutex::new(Vec::new()),
            failing: HashSet::new(),
            delay: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Fail every fetch of `url`.
    pub(crate) fn failing(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    /// Sleep this long inside each fetch.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for RecordingFetcher {
    async fn fetch(
        &self,
        url: &str,
        integrity: &str,
        cache_dir: Option<&Path>,
        dest_dir: Option<&Path>,
    ) -> Result<(), PkgError> {
        self.calls.lock().unwrap().push(FetchCall {
            url: url.to_string(),
            integrity: integrity.to_string(),
            cache_dir: cache_dir.map(Path::to_path_buf),
            dest_dir: dest_dir.map(Path::to_path_buf),
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(url) {
            return Err(PkgError::download_failed(format!("404 for '{url}'")));
        }
        if let Some(cache) = cache_dir {
            self.fs.add_dir(cache);
        }
        if let Some(dest) = dest_dir {
            self.fs.add_dir(dest);
        }
        Ok(())
    }
}
