//! Package install error types.

use std::fmt;
use std::io;

/// Package install error codes.
pub mod codes {
    pub const PKG_DOWNLOAD_FAILED: &str = "PKG_DOWNLOAD_FAILED";
    pub const PKG_EXTRACT_FAILED: &str = "PKG_EXTRACT_FAILED";
    pub const PKG_INTEGRITY_INVALID: &str = "PKG_INTEGRITY_INVALID";
    pub const PKG_INTEGRITY_MISMATCH: &str = "PKG_INTEGRITY_MISMATCH";
    pub const PKG_CACHE_ERROR: &str = "PKG_CACHE_ERROR";
    pub const NODE_MODULES_WRITE_FAILED: &str = "NODE_MODULES_WRITE_FAILED";
    pub const PKG_INSTALL_CANCELLED: &str = "PKG_INSTALL_CANCELLED";
}

/// Package install error.
#[derive(Debug, Clone)]
pub struct PkgError {
    code: &'static str,
    message: String,
}

impl PkgError {
    /// Create a new error with the given code and message.
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

    /// Create a download failed error.
    pub fn download_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_DOWNLOAD_FAILED, msg)
    }

    /// Create an extraction failed error.
    pub fn extract_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_EXTRACT_FAILED, msg)
    }

    /// Create an error for an integrity string with no usable hash.
    pub fn integrity_invalid(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_INTEGRITY_INVALID, msg)
    }

    /// Create an error for downloaded bytes that do not match their digest.
    pub fn integrity_mismatch(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_INTEGRITY_MISMATCH, msg)
    }

    /// Create a cache error.
    pub fn cache_error(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_CACHE_ERROR, msg)
    }

    /// Create a `node_modules` write failed error.
    pub fn node_modules_write_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::NODE_MODULES_WRITE_FAILED, msg)
    }

    /// Create an error for a task that never started because the install was aborted.
    #[must_use]
    pub fn cancelled(name: &str) -> Self {
        Self::new(
            codes::PKG_INSTALL_CANCELLED,
            format!("Install of '{name}' cancelled after an earlier failure"),
        )
    }

    /// Whether this error only records cancellation rather than a real failure.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.code == codes::PKG_INSTALL_CANCELLED
    }
}

impl fmt::Display for PkgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PkgError {}

impl From<io::Error> for PkgError {
    fn from(e: io::Error) -> Self {
        Self::new(codes::PKG_CACHE_ERROR, e.to_string())
    }
}
