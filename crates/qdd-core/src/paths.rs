use std::path::{Path, PathBuf};

/// Name of the directory packages are installed into.
pub const NODE_MODULES: &str = "node_modules";

/// Get the default package cache directory: `~/.cache/qdd`.
///
/// Falls back to `.qdd-cache` in the working directory when no home
/// directory can be determined.
#[must_use]
pub fn default_cache_dir() -> PathBuf {
    dirs_next::home_dir().map_or_else(
        || PathBuf::from(".qdd-cache"),
        |home| home.join(".cache").join("qdd"),
    )
}

/// Get the `node_modules` directory directly under `dir`.
#[must_use]
pub fn node_modules_dir(dir: &Path) -> PathBuf {
    dir.join(NODE_MODULES)
}

/// Get the install location of dependency `name` beneath `parent`.
///
/// Scoped names (`@scope/name`) nest one level deeper, as `node_modules` expects.
#[must_use]
pub fn package_dest_dir(parent: &Path, name: &str) -> PathBuf {
    node_modules_dir(parent).join(name)
}
