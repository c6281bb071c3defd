//! Subresource Integrity strings.
//!
//! An integrity string is one or more whitespace-separated `alg-digest`
//! tokens where `digest` is base64. Tokens may carry a `?options` suffix,
//! which is ignored. Verification uses the strongest algorithm present.

use super::error::PkgError;
use qdd_util::hash;
use std::fmt;
use std::str::FromStr;

/// Supported hash algorithms, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Algorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl Algorithm {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }

    /// Base64 digest of `data` under this algorithm.
    #[must_use]
    pub fn digest(&self, data: &[u8]) -> String {
        match self {
            Self::Sha1 => hash::sha1_base64(data),
            Self::Sha256 => hash::sha256_base64(data),
            Self::Sha384 => hash::sha384_base64(data),
            Self::Sha512 => hash::sha512_base64(data),
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "sha1" => Some(Self::Sha1),
            "sha256" => Some(Self::Sha256),
            "sha384" => Some(Self::Sha384),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }
}

/// A single `alg-digest` token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityHash {
    pub algorithm: Algorithm,
    pub digest: String,
}

impl fmt::Display for IntegrityHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.algorithm.as_str(), self.digest)
    }
}

/// A parsed integrity string with at least one supported hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Integrity {
    hashes: Vec<IntegrityHash>,
}

impl Integrity {
    /// Compute the integrity of `data` under one algorithm.
    #[must_use]
    pub fn compute(algorithm: Algorithm, data: &[u8]) -> Self {
        Self {
            hashes: vec![IntegrityHash {
                algorithm,
                digest: algorithm.digest(data),
            }],
        }
    }

    /// The strongest algorithm present.
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.hashes
            .iter()
            .map(|h| h.algorithm)
            .max()
            .unwrap_or(Algorithm::Sha1)
    }

    /// Check `data` against the strongest hashes.
    ///
    /// # Errors
    /// Returns `PKG_INTEGRITY_MISMATCH` if no hash of the strongest algorithm matches.
    pub fn verify(&self, data: &[u8]) -> Result<(), PkgError> {
        let algorithm = self.algorithm();
        let actual = algorithm.digest(data);

        if self
            .hashes
            .iter()
            .any(|h| h.algorithm == algorithm && h.digest == actual)
        {
            return Ok(());
        }

        Err(PkgError::integrity_mismatch(format!(
            "Integrity check failed: expected {self}, got {}-{actual}",
            algorithm.as_str()
        )))
    }
}

impl FromStr for Integrity {
    type Err = PkgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hashes: Vec<IntegrityHash> = s
            .split_whitespace()
            .filter_map(|token| {
                let token = token.split('?').next().unwrap_or(token);
                let (alg, digest) = token.split_once('-')?;
                let algorithm = Algorithm::parse(alg)?;
                if digest.is_empty() {
                    return None;
                }
                Some(IntegrityHash {
                    algorithm,
                    digest: digest.to_string(),
                })
            })
            .collect();

        if hashes.is_empty() {
            return Err(PkgError::integrity_invalid(format!(
                "No supported hash in integrity string '{s}'"
            )));
        }

        Ok(Self { hashes })
    }
}

impl fmt::Display for Integrity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for h in &self.hashes {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{h}")?;
            first = false;
        }
        Ok(())
    }
}
