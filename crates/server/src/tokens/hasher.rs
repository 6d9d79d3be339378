//! One-way digest for opaque secrets at rest.
//!
//! Secrets carry at least 24 bytes of OS randomness, so the digest is
//! unsalted: the same input always maps to the same column value and lookups
//! are plain equality matches.

use sha3::{Digest, Sha3_256};

/// SHA3-256 over the UTF-8 bytes of `secret`, lowercase hex.
pub fn hash_token(secret: &str) -> String {
    let digest = Sha3_256::digest(secret.as_bytes());
    format!("{digest:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_known_sha3_vectors() {
        assert_eq!(
            hash_token(""),
            "a7ffc6f8bf1ed76651c14756a061d662f580ff4de43b49fa82d80a4b80f8434a"
        );
        assert_eq!(
            hash_token("abc"),
            "3a985da74fe225b2045c172d6bd390bd855f086e3e9d525b46bfe24511431532"
        );
    }

    #[test]
    fn deterministic_and_distinct() {
        let a = hash_token("aQ3x_secret-value-with-plenty-of-entropy");
        assert_eq!(a, hash_token("aQ3x_secret-value-with-plenty-of-entropy"));
        assert_ne!(a, hash_token("aQ3x_secret-value-with-plenty-of-entropy!"));
        assert_eq!(a.len(), 64);
    }
}
