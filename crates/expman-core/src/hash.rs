//! Content hashing over canonical JSON.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::codec::to_canonical_json_bytes;
use crate::errors::ExpError;

/// Computes a stable hexadecimal SHA-256 digest of the canonical JSON form of `value`.
pub fn stable_hash_string<T: Serialize>(value: &T) -> Result<String, ExpError> {
    let bytes = to_canonical_json_bytes(value)?;
    Ok(hex::encode(Sha256::digest(bytes)))
}

/// Returns the first `length` hex characters of [`stable_hash_string`].
pub fn short_hash<T: Serialize>(value: &T, length: usize) -> Result<String, ExpError> {
    let mut digest = stable_hash_string(value)?;
    digest.truncate(length);
    Ok(digest)
}
