//! Credential lifecycle: authorization codes, refresh tokens and signed
//! access tokens.
//!
//! Codes and refresh tokens are opaque random strings; only their
//! [`hasher::hash_token`] digest ever reaches the database. Every
//! invalidation is a single `DELETE ... RETURNING` so two racing requests can
//! never both redeem the same secret.

pub mod access_token;
pub mod auth_code;
pub mod hasher;
pub mod pkce;
pub mod refresh_token;

pub use access_token::{AccessToken, AccessTokenIssuer, SigningKey, ValidatedAccessToken};
pub use auth_code::{AuthorizationCodeStore, ConsumedCode};
pub use hasher::hash_token;
pub use pkce::PkceBinding;
pub use refresh_token::{RefreshTokenStore, RotatedToken};

use crate::error::AuthError;
use sea_orm::sea_query::Query;
use sea_orm::{Condition, ConnectionTrait, DbErr, EntityName, EntityTrait};

/// Generate a URL-safe random secret from `bytes` bytes of OS randomness.
///
/// The encoded length is `bytes * 4 / 3` characters.
pub(crate) fn generate_secret(bytes: usize) -> Result<String, AuthError> {
    use base64::Engine;
    let mut buf = vec![0u8; bytes];
    getrandom::fill(&mut buf)?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

/// Delete the row matching `condition` and hand back what was deleted, in one
/// statement.
///
/// A row that exists but no longer decodes surfaces as a `DbErr`, which the
/// callers treat as corruption rather than an invalid secret.
pub(crate) async fn delete_returning<E, C>(
    conn: &C,
    condition: Condition,
) -> Result<Option<E::Model>, DbErr>
where
    E: EntityTrait,
    C: ConnectionTrait,
{
    let mut delete = Query::delete();
    delete
        .from_table(E::default().table_ref())
        .cond_where(condition)
        .returning_all();
    let stmt = conn.get_database_backend().build(&delete);
    E::find().from_raw_sql(stmt).one(conn).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_secrets_have_expected_length_and_alphabet() {
        let code = generate_secret(24).unwrap();
        let token = generate_secret(48).unwrap();
        assert_eq!(code.len(), 32);
        assert_eq!(token.len(), 64);
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        assert_ne!(generate_secret(24).unwrap(), code);
    }
}
