use base64::prelude::{Engine as _, BASE64_STANDARD};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

/// Hash `data` with `D` and return the standard (padded) base64 encoding of the digest.
///
/// This is the digest encoding used by Subresource Integrity strings.
#[must_use]
pub fn base64_digest<D: Digest>(data: &[u8]) -> String {
    BASE64_STANDARD.encode(D::digest(data))
}

#[must_use]
pub fn sha1_base64(data: &[u8]) -> String {
    base64_digest::<Sha1>(data)
}

#[must_use]
pub fn sha256_base64(data: &[u8]) -> String {
    base64_digest::<Sha256>(data)
}

#[must_use]
pub fn sha384_base64(data: &[u8]) -> String {
    base64_digest::<Sha384>(data)
}

#[must_use]
pub fn sha512_base64(data: &[u8]) -> String {
    base64_digest::<Sha512>(data)
}
