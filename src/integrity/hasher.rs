//! SHA-256 digests for stored objects.

use sha2::{Digest as _, Sha256};

/// Hash algorithm identifier used in receipts.
pub const HASH_ALGORITHM: &str = "SHA-256";

/// SHA-256 of `bytes` as a lowercase hexadecimal string (64 characters).
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Digest over an ordered list of `(key, hash)` pairs.
///
/// Any change to a member's content, name or position changes the result.
pub fn combine_hashes<'a>(members: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut hasher = Sha256::new();
    for (key, hash) in members {
        hasher.update(key.as_bytes());
        hasher.update([0]);
        hasher.update(hash.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}
