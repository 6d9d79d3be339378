//! Password hashing and credential checks for the native provider.
//!
//! Uses bcrypt. Hashing runs on the blocking pool since a single call at the
//! default cost takes a few hundred milliseconds.

use crate::error::AuthError;
use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$")
        .expect("email pattern compiles")
});

/// Whether `candidate` looks like a deliverable address. No DNS lookups.
pub fn is_valid_email(candidate: &str) -> bool {
    candidate.len() <= 254 && EMAIL_RE.is_match(candidate)
}

/// Hash a password with bcrypt at `cost`.
pub async fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AuthError::Internal(format!("password hashing task failed: {e}")))?
        .map_err(AuthError::from)
}

/// Compare `password` with a stored bcrypt hash.
///
/// A stored value that is not a bcrypt hash never matches.
pub async fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let password = password.to_owned();
    let hash = hash.to_owned();
    let result = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AuthError::Internal(format!("password check task failed: {e}")))?;
    match result {
        Ok(matches) => Ok(matches),
        Err(e) => {
            tracing::warn!(error = %e, "stored password hash is unreadable");
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_addresses() {
        assert!(is_valid_email("someone@example.com"));
        assert!(is_valid_email("first.last+tag@sub.example.co.uk"));
    }

    #[test]
    fn rejects_non_addresses() {
        for bad in ["", "someone", "someone@", "@example.com", "a b@example.com", "someone@localhost"] {
            assert!(!is_valid_email(bad), "{bad} should be rejected");
        }
    }

    #[tokio::test]
    async fn hash_and_verify() {
        let hash = hash_password("correct horse", 4).await.unwrap();
        assert!(hash.starts_with("$2"));
        assert!(verify_password("correct horse", &hash).await.unwrap());
        assert!(!verify_password("battery staple", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn same_password_gets_distinct_salts() {
        let a = hash_password("pw", 4).await.unwrap();
        let b = hash_password("pw", 4).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn garbage_hash_never_matches() {
        assert!(!verify_password("pw", "not-a-bcrypt-hash").await.unwrap());
        assert!(!verify_password("pw", "").await.unwrap());
    }
}
