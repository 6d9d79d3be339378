//! Proof Key for Code Exchange (RFC 7636), S256 only.

use base64::Engine;
use sha2::{Digest, Sha256};

pub const METHOD_S256: &str = "S256";

/// PKCE parameters bound to an authorization code at issue time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceBinding {
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub resource: Option<String>,
}

impl PkceBinding {
    pub fn s256(code_challenge: impl Into<String>, resource: Option<String>) -> Self {
        Self {
            code_challenge: code_challenge.into(),
            code_challenge_method: METHOD_S256.to_string(),
            resource,
        }
    }

    /// Recompute the challenge from `code_verifier` and compare.
    pub fn verify(&self, code_verifier: &str) -> bool {
        self.code_challenge_method == METHOD_S256
            && constant_time_eq(
                code_challenge(code_verifier).as_bytes(),
                self.code_challenge.as_bytes(),
            )
    }
}

/// `BASE64URL(SHA256(code_verifier))` without padding.
pub fn code_challenge(code_verifier: &str) -> String {
    let digest = Sha256::digest(code_verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

/// An S256 challenge is the unpadded base64url encoding of 32 bytes.
pub fn is_well_formed_challenge(challenge: &str) -> bool {
    challenge.len() == 43
        && challenge
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
