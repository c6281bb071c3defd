//! Tarball download and extraction.

use super::error::PkgError;
use bytes::Bytes;
use flate2::read::GzDecoder;
use reqwest::Client;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tar::Archive;
use tempfile::TempDir;

/// Largest tarball accepted (200 MB).
pub const MAX_TARBALL_SIZE: u64 = 200 * 1024 * 1024;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// GET `url` and return the body.
///
/// # Errors
/// Returns `PKG_DOWNLOAD_FAILED` on transport errors, non-2xx responses, or
/// bodies over `max_bytes`.
pub async fn download_tarball(
    client: &Client,
    url: &str,
    max_bytes: u64,
) -> Result<Bytes, PkgError> {
    let response = client
        .get(url)
        .timeout(DOWNLOAD_TIMEOUT)
        .send()
        .await
        .map_err(|e| PkgError::download_failed(format!("GET {url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(PkgError::download_failed(format!("GET {url}: HTTP {status}")));
    }

    // Reject early when the server announces an oversized body
    check_size(response.content_length().unwrap_or(0), max_bytes)?;

    let body = response
        .bytes()
        .await
        .map_err(|e| PkgError::download_failed(format!("GET {url}: reading body: {e}")))?;
    check_size(body.len() as u64, max_bytes)?;

    Ok(body)
}

/// Reject payloads over `max_bytes`.
pub(crate) fn check_size(len: u64, max_bytes: u64) -> Result<(), PkgError> {
    if len > max_bytes {
        return Err(PkgError::download_failed(format!(
            "tarball is {len} bytes, limit is {max_bytes}"
        )));
    }
    Ok(())
}

/// Extract a tarball into a cache slot atomically.
///
/// Extraction happens in a temp directory next to `dest`, and the package
/// root is renamed into place. If another writer creates `dest` first, its
/// result is kept.
///
/// # Errors
/// Returns `PKG_EXTRACT_FAILED` if the archive is unreadable or malformed.
pub fn extract_tgz_atomic(bytes: &[u8], dest: &Path) -> Result<(), PkgError> {
    if dest.is_dir() {
        return Ok(());
    }

    let staging = stage(bytes, dest)?;
    let root = package_root(staging.path())?;

    match fs::rename(&root, dest) {
        Ok(()) => Ok(()),
        // Lost a race with a concurrent extraction of the same digest
        Err(_) if dest.is_dir() => Ok(()),
        Err(e) => Err(PkgError::extract_failed(format!(
            "moving package into {}: {e}",
            dest.display()
        ))),
    }
}

/// Extract a tarball into `dest`, merging with anything already there.
///
/// Used for `node_modules` targets, where nested dependencies may have been
/// installed under `dest/node_modules` before the parent package lands.
///
/// # Errors
/// Returns an error if extraction fails or the files cannot be moved.
pub fn extract_tgz_merge(bytes: &[u8], dest: &Path) -> Result<(), PkgError> {
    let staging = stage(bytes, dest)?;
    let root = package_root(staging.path())?;

    qdd_util::fs::move_merge(&root, dest).map_err(|e| {
        PkgError::node_modules_write_failed(format!(
            "installing package into {}: {e}",
            dest.display()
        ))
    })
}

/// Unpack `bytes` into a fresh temp directory beside `dest`.
///
/// The directory is removed when the returned handle drops.
fn stage(bytes: &[u8], dest: &Path) -> Result<TempDir, PkgError> {
    let parent = dest.parent().ok_or_else(|| {
        PkgError::extract_failed(format!("{} has no parent directory", dest.display()))
    })?;
    fs::create_dir_all(parent)?;

    let staging = tempfile::Builder::new()
        .prefix(".qdd-tmp-")
        .tempdir_in(parent)?;

    unpack(bytes, staging.path())?;
    Ok(staging)
}

/// The directory holding the package inside an unpacked archive.
///
/// npm packs everything under `package/`; a few publishers use another
/// single top-level name instead.
fn package_root(unpacked: &Path) -> Result<PathBuf, PkgError> {
    let conventional = unpacked.join("package");
    if conventional.is_dir() {
        return Ok(conventional);
    }

    let mut dirs = fs::read_dir(unpacked)?
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
        .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .map(|e| e.path());

    match (dirs.next(), dirs.next()) {
        (Some(root), None) => Ok(root),
        (None, _) => Err(PkgError::extract_failed("archive has no top-level directory")),
        (Some(_), Some(_)) => Err(PkgError::extract_failed(
            "archive has more than one top-level directory",
        )),
    }
}

/// Where an archive member lands under `root`, or an error if it would escape.
fn member_target(root: &Path, member: &Path) -> Result<PathBuf, PkgError> {
    let mut target = root.to_path_buf();
    for component in member.components() {
        match component {
            Component::Normal(part) => target.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(PkgError::extract_failed(format!(
                    "archive member escapes the package: {}",
                    member.display()
                )));
            }
        }
    }
    Ok(target)
}

fn unpack(bytes: &[u8], root: &Path) -> Result<(), PkgError> {
    let bad_archive = |e: io::Error| PkgError::extract_failed(format!("corrupt archive: {e}"));

    let mut archive = Archive::new(GzDecoder::new(bytes));
    for entry in archive.entries().map_err(bad_archive)? {
        let mut entry = entry.map_err(bad_archive)?;
        let member = entry.path().map_err(bad_archive)?.into_owned();
        let target = member_target(root, &member)?;
        let kind = entry.header().entry_type();

        if kind.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        // Links, devices and the like are not installed
        if !kind.is_file() {
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        io::copy(&mut entry, &mut fs::File::create(&target)?)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(mode) = entry.header().mode() {
                let _ = fs::set_permissions(&target, fs::Permissions::from_mode(mode));
            }
        }
    }

    Ok(())
}
