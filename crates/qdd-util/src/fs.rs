use std::fs;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

/// Check whether `path` exists and is a directory.
///
/// A missing path is `Ok(false)`. Any other metadata failure is returned.
///
/// # Errors
/// Returns an error if the path exists but its metadata cannot be read.
pub fn is_dir(path: &Path) -> io::Result<bool> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.is_dir()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Recursively copy the contents of `src` into `dst`.
///
/// `dst` is created if needed and merged with whatever it already holds.
/// Symlinks are skipped.
///
/// # Errors
/// Returns an error if `src` cannot be walked or any entry cannot be copied.
pub fn copy_dir_all(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;

    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry?;
        let rel = entry.path().strip_prefix(src).map_err(io::Error::other)?;
        let target = dst.join(rel);

        let ty = entry.file_type();
        if ty.is_dir() {
            fs::create_dir_all(&target)?;
        } else if ty.is_file() {
            fs::copy(entry.path(), &target)?;
        }
    }

    Ok(())
}

/// Move the directory `src` to `dst`, merging into `dst` if it already exists.
///
/// When `dst` is absent this is a single rename. Otherwise each child of `src`
/// is moved across, recursing into directories present on both sides.
///
/// # Errors
/// Returns an error if a rename fails for a reason other than a concurrent
/// creation of `dst`.
pub fn move_merge(src: &Path, dst: &Path) -> io::Result<()> {
    if !dst.exists() {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        match fs::rename(src, dst) {
            Ok(()) => return Ok(()),
            // Someone created dst in the meantime; merge instead.
            Err(_) if dst.is_dir() => {}
            Err(e) => return Err(e),
        }
    }

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());

        if entry.file_type()?.is_dir() && to.is_dir() {
            move_merge(&from, &to)?;
        } else {
            fs::rename(&from, &to)?;
        }
    }

    Ok(())
}
