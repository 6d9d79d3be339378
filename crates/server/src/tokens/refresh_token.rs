use super::{delete_returning, generate_secret, hash_token};
use crate::config::DEFAULT_REFRESH_TOKEN_TTL;
use crate::entity::refresh_token;
use crate::error::AuthError;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    QueryFilter, TransactionTrait,
};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

/// 48 random bytes encode to a 64 character token.
const REFRESH_TOKEN_BYTES: usize = 48;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotatedToken {
    pub token: String,
    pub identity_id: String,
}

#[derive(Clone)]
pub struct RefreshTokenStore {
    db: Arc<DatabaseConnection>,
    ttl: Duration,
}

impl RefreshTokenStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self::with_ttl(db, Duration::seconds(DEFAULT_REFRESH_TOKEN_TTL))
    }

    pub fn with_ttl(db: Arc<DatabaseConnection>, ttl: Duration) -> Self {
        Self { db, ttl }
    }

    #[tracing::instrument(skip(self))]
    pub async fn issue(&self, identity_id: &str) -> Result<String, AuthError> {
        if identity_id.is_empty() {
            return Err(AuthError::InvalidInput("identity id is required".into()));
        }

        let token = generate_secret(REFRESH_TOKEN_BYTES)?;
        let now = OffsetDateTime::now_utc();
        refresh_token::ActiveModel {
            token_hash: Set(hash_token(&token)),
            identity_id: Set(identity_id.to_string()),
            expires_at: Set(now + self.ttl),
            created_at: Set(now),
        }
        .insert(self.db.as_ref())
        .await?;

        Ok(token)
    }

    /// Exchange `old_token` for a new one bound to the same identity and the
    /// same absolute expiry.
    ///
    /// The old row is deleted and the new one inserted inside one
    /// transaction. Of two concurrent rotations of the same token only one
    /// sees the deleted row; the other gets `Ok(None)`.
    #[tracing::instrument(skip_all)]
    pub async fn rotate(&self, old_token: &str) -> Result<Option<RotatedToken>, AuthError> {
        let old_hash = hash_token(old_token);
        let new_token = generate_secret(REFRESH_TOKEN_BYTES)?;
        let new_hash = hash_token(&new_token);

        let txn = self.db.begin().await?;
        let deleted = delete_returning::<refresh_token::Entity, _>(
            &txn,
            Condition::all().add(refresh_token::Column::TokenHash.eq(old_hash)),
        )
        .await?;

        let now = OffsetDateTime::now_utc();
        let Some(old) = deleted.filter(|row| row.expires_at >= now) else {
            txn.commit().await?;
            return Ok(None);
        };

        refresh_token::ActiveModel {
            token_hash: Set(new_hash),
            identity_id: Set(old.identity_id.clone()),
            expires_at: Set(old.expires_at),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        tracing::debug!(identity_id = %old.identity_id, "refresh token rotated");
        Ok(Some(RotatedToken {
            token: new_token,
            identity_id: old.identity_id,
        }))
    }

    /// Identity owning a live `token`, without rotating it.
    #[tracing::instrument(skip_all)]
    pub async fn validate(&self, token: &str) -> Result<Option<String>, AuthError> {
        let row = refresh_token::Entity::find_by_id(hash_token(token))
            .filter(refresh_token::Column::ExpiresAt.gte(OffsetDateTime::now_utc()))
            .one(self.db.as_ref())
            .await?;
        Ok(row.map(|r| r.identity_id))
    }

    /// Delete `token` if it exists. Revoking twice is not an error.
    #[tracing::instrument(skip_all)]
    pub async fn revoke(&self, token: &str) -> Result<(), AuthError> {
        let result = refresh_token::Entity::delete_by_id(hash_token(token))
            .exec(self.db.as_ref())
            .await?;
        tracing::debug!(revoked = result.rows_affected, "refresh token revoke");
        Ok(())
    }
}
