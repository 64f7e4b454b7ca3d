//! Content-addressed archive references.
//!
//! Package archives are stored by SHA-256 digest. A version's `contents`
//! field holds the digest, never the bytes.

use std::fmt::{self, Write};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A content hash (SHA-256 hex digest).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(pub String);

impl ContentHash {
    /// Digest of an archive.
    pub fn compute(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest {
            let _ = write!(hex, "{byte:02x}");
        }
        ContentHash(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Directory fan-out prefix used by on-disk blob stores.
    pub fn shard(&self) -> &str {
        self.0.get(..2).unwrap_or("00")
    }

    /// Whether `data` hashes to this digest.
    pub fn verify(&self, data: &[u8]) -> bool {
        ContentHash::compute(data) == *self
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_deterministic() {
        assert_eq!(ContentHash::compute(b"archive"), ContentHash::compute(b"archive"));
    }

    #[test]
    fn hash_differs_for_different_data() {
        assert_ne!(ContentHash::compute(b"v1"), ContentHash::compute(b"v2"));
    }

    #[test]
    fn hash_verify() {
        let hash = ContentHash::compute(b"tarball bytes");
        assert!(hash.verify(b"tarball bytes"));
        assert!(!hash.verify(b"tampered bytes"));
    }

    #[test]
    fn shard_is_digest_prefix() {
        let hash = ContentHash::compute(b"archive");
        assert_eq!(hash.shard(), &hash.as_str()[..2]);
    }

    #[test]
    fn empty_input_digest() {
        assert_eq!(
            ContentHash::compute(b"").as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
