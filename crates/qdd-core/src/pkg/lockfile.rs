//! Lock file types for package installation.
//!
//! qdd reads npm's `package-lock.json`: a recursive tree in which every
//! node has an optional `dependencies` map of name to entry, and each entry
//! pins its source URL (`resolved`) and content digest (`integrity`).
//!
//! ```json
//! {
//!   "name": "my-project",
//!   "lockfileVersion": 1,
//!   "dependencies": {
//!     "a": {
//!       "version": "1.0.0",
//!       "resolved": "https://registry.npmjs.org/a/-/a-1.0.0.tgz",
//!       "integrity": "sha512-...",
//!       "dependencies": { "b": { ... } }
//!     }
//!   }
//! }
//! ```
//!
//! ## In-line override
//!
//! When the project has no readable lock file, the path in `QDD_LOCKJS` may
//! point at a text file (typically a script) embedding one in a comment block:
//!
//! ```text
//! /**package-lock
//!  * { "dependencies": { ... } }
//!  **/
//! ```

use indexmap::IndexMap;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

/// Lock file name looked up in the project directory.
pub const LOCKFILE_NAME: &str = "package-lock.json";

/// Environment variable naming a file with an in-line lock file.
pub const INLINE_LOCK_ENV: &str = "QDD_LOCKJS";

/// Lock file error codes.
pub mod codes {
    /// Lock file not found at the expected path.
    pub const PKG_LOCK_NOT_FOUND: &str = "PKG_LOCK_NOT_FOUND";
    /// Lock file has invalid JSON.
    pub const PKG_LOCK_INVALID_JSON: &str = "PKG_LOCK_INVALID_JSON";
    /// Override file has no `/**package-lock ... **/` block.
    pub const PKG_LOCK_INLINE_MISSING: &str = "PKG_LOCK_INLINE_MISSING";
    /// In-line lock block is not valid JSON.
    pub const PKG_LOCK_INLINE_INVALID: &str = "PKG_LOCK_INLINE_INVALID";
    /// A non-bundled entry lacks `integrity` or `resolved`.
    pub const PKG_LOCK_ENTRY_INVALID: &str = "PKG_LOCK_ENTRY_INVALID";
}

/// Dependency map keyed by package name, in lock file order.
pub type Dependencies = IndexMap<String, DependencyEntry>;

/// The root of a lock file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LockNode {
    /// Direct dependencies. Absent means nothing to install.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Dependencies>,
}

/// One locked dependency.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyEntry {
    /// Subresource integrity string, e.g. `sha512-...`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,

    /// Tarball URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,

    /// Development-only dependency.
    #[serde(default, skip_serializing_if = "is_false")]
    pub dev: bool,

    /// Shipped inside its parent's tarball; never fetched on its own.
    #[serde(default, skip_serializing_if = "is_false")]
    pub bundled: bool,

    /// Nested dependencies installed under this entry's own `node_modules`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Dependencies>,

    /// Fields qdd does not interpret (`version`, `requires`, ...), kept for diagnostics.
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(b: &bool) -> bool {
    !*b
}

impl DependencyEntry {
    /// Create an entry with a URL and digest.
    #[must_use]
    pub fn new(resolved: impl Into<String>, integrity: impl Into<String>) -> Self {
        Self {
            integrity: Some(integrity.into()),
            resolved: Some(resolved.into()),
            ..Default::default()
        }
    }

    /// Mark as development-only.
    #[must_use]
    pub fn dev(mut self) -> Self {
        self.dev = true;
        self
    }

    /// Mark as bundled.
    #[must_use]
    pub fn bundled(mut self) -> Self {
        self.bundled = true;
        self
    }

    /// Add a nested dependency.
    #[must_use]
    pub fn with_dependency(mut self, name: impl Into<String>, entry: DependencyEntry) -> Self {
        self.dependencies
            .get_or_insert_with(IndexMap::new)
            .insert(name.into(), entry);
        self
    }

    /// Locked version, if recorded.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.other.get("version").and_then(Value::as_str)
    }
}

impl LockNode {
    /// Add a top-level dependency.
    #[must_use]
    pub fn with_dependency(mut self, name: impl Into<String>, entry: DependencyEntry) -> Self {
        self.dependencies
            .get_or_insert_with(IndexMap::new)
            .insert(name.into(), entry);
        self
    }

    /// Read a lock file from a path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn read_from(path: &Path) -> Result<Self, LockfileError> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                LockfileError::new(
                    codes::PKG_LOCK_NOT_FOUND,
                    format!("Lock file not found: {}", path.display()),
                )
            } else {
                LockfileError::new(
                    codes::PKG_LOCK_NOT_FOUND,
                    format!("Failed to read lock file {}: {e}", path.display()),
                )
            }
        })?;

        Self::from_json(&content)
    }

    /// Deserialize from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid.
    pub fn from_json(json: &str) -> Result<Self, LockfileError> {
        serde_json::from_str(json).map_err(|e| {
            LockfileError::new(
                codes::PKG_LOCK_INVALID_JSON,
                format!("Invalid lock file JSON: {e}"),
            )
        })
    }

    /// Extract and parse an in-line lock file from arbitrary text.
    ///
    /// # Errors
    ///
    /// Returns `PKG_LOCK_INLINE_MISSING` if no block is present and
    /// `PKG_LOCK_INLINE_INVALID` if its contents are not valid JSON.
    pub fn from_inline(content: &str) -> Result<Self, LockfileError> {
        let json = extract_inline_block(content).ok_or_else(|| {
            LockfileError::new(
                codes::PKG_LOCK_INLINE_MISSING,
                "no in-line package-lock block found",
            )
        })?;

        serde_json::from_str(&json).map_err(|e| {
            LockfileError::new(
                codes::PKG_LOCK_INLINE_INVALID,
                format!("badly formed in-line package-lock: {e}"),
            )
        })
    }

    /// Load the lock file for a project.
    ///
    /// Reads `<project_root>/package-lock.json`. If that fails and
    /// `inline_source` is given, the in-line block in that file is used instead.
    ///
    /// # Errors
    ///
    /// Returns the primary error when there is no override, otherwise the
    /// override's error.
    pub fn load(project_root: &Path, inline_source: Option<&Path>) -> Result<Self, LockfileError> {
        let primary = Self::read_from(&project_root.join(LOCKFILE_NAME));

        match (primary, inline_source) {
            (Ok(node), _) => Ok(node),
            (Err(e), None) => Err(e),
            (Err(_), Some(path)) => {
                let content = fs::read_to_string(path).map_err(|e| {
                    LockfileError::new(
                        codes::PKG_LOCK_NOT_FOUND,
                        format!("Failed to read {INLINE_LOCK_ENV} file {}: {e}", path.display()),
                    )
                })?;
                Self::from_inline(&content)
            }
        }
    }
}

/// Pull the JSON text out of a `/**package-lock ... **/` block.
///
/// The opening marker must start a line; the block ends at the first line
/// ending in `**/`. Leading `*` gutters are stripped from every line.
fn extract_inline_block(content: &str) -> Option<String> {
    let start = Regex::new(r"(?m)^/\*\*package-lock(?:\s|$)").ok()?;
    let end = Regex::new(r"(?m)\*\*/$").ok()?;
    let gutter = Regex::new(r"(?m)^\s*\*").ok()?;

    let after = &content[start.find(content)?.end()..];
    let body = &after[..end.find(after)?.start()];

    Some(gutter.replace_all(body, "").into_owned())
}

/// Lock file error.
#[derive(Debug)]
pub struct LockfileError {
    code: &'static str,
    message: String,
}

impl LockfileError {
    /// Create a new error.
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Get the error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// Get the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for LockfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for LockfileError {}
