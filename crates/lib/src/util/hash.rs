//! Hashing helpers for cache identity tags.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 over the given parts, each terminated by a NUL byte so that
/// `["ab", "c"]` and `["a", "bc"]` hash differently.
pub fn hash_parts<I, S>(parts: I) -> String
where
  I: IntoIterator<Item = S>,
  S: AsRef<[u8]>,
{
  let mut hasher = Sha256::new();
  for part in parts {
    hasher.update(part.as_ref());
    hasher.update([0u8]);
  }
  hex::encode(hasher.finalize())
}
