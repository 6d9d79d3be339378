//! Identity store: who a token's `sub` refers to.
//!
//! The token lifecycle only needs a handful of lookups, expressed as the
//! [`IdentityStore`] trait. [`DbIdentityStore`] implements it over the
//! `identity` table.

use crate::entity::identity;
use crate::error::AuthError;
use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, SqlErr,
};
use std::sync::Arc;
use time::OffsetDateTime;

/// Profile attributes copied from an ID token onto an identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileClaims {
    pub email: Option<String>,
    pub email_verified: bool,
    pub name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub picture: Option<String>,
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<identity::Model>, AuthError>;

    /// Identity created from an external provider's `sub` at `issuer`.
    async fn find_by_external_id(
        &self,
        subject: &str,
        issuer: &str,
    ) -> Result<Option<identity::Model>, AuthError>;

    async fn find_by_email(
        &self,
        email: &str,
        issuer: &str,
    ) -> Result<Option<identity::Model>, AuthError>;

    /// Create an identity for `subject` at `issuer`. If one already exists
    /// (a concurrent first sign-in won), that identity is returned instead.
    async fn create_with_claims(
        &self,
        subject: &str,
        issuer: &str,
        claims: &ProfileClaims,
    ) -> Result<identity::Model, AuthError>;

    /// Create a native identity for `email` at `issuer`. If one already
    /// exists it is returned unchanged, with its own password hash; callers
    /// must check the password against the returned row.
    async fn create_with_password(
        &self,
        email: &str,
        password_hash: &str,
        issuer: &str,
    ) -> Result<identity::Model, AuthError>;

    async fn update_with_claims(
        &self,
        id: &str,
        claims: &ProfileClaims,
    ) -> Result<identity::Model, AuthError>;
}

#[derive(Clone)]
pub struct DbIdentityStore {
    db: Arc<DatabaseConnection>,
}

impl DbIdentityStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl IdentityStore for DbIdentityStore {
    #[tracing::instrument(skip(self))]
    async fn find_by_id(&self, id: &str) -> Result<Option<identity::Model>, AuthError> {
        Ok(identity::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?)
    }

    #[tracing::instrument(skip(self))]
    async fn find_by_external_id(
        &self,
        subject: &str,
        issuer: &str,
    ) -> Result<Option<identity::Model>, AuthError> {
        Ok(identity::Entity::find()
            .filter(identity::Column::ExternalId.eq(subject))
            .filter(identity::Column::Issuer.eq(issuer))
            .one(self.db.as_ref())
            .await?)
    }

    #[tracing::instrument(skip(self))]
    async fn find_by_email(
        &self,
        email: &str,
        issuer: &str,
    ) -> Result<Option<identity::Model>, AuthError> {
        Ok(identity::Entity::find()
            .filter(identity::Column::Email.eq(email))
            .filter(identity::Column::Issuer.eq(issuer))
            .one(self.db.as_ref())
            .await?)
    }

    #[tracing::instrument(skip(self, claims))]
    async fn create_with_claims(
        &self,
        subject: &str,
        issuer: &str,
        claims: &ProfileClaims,
    ) -> Result<identity::Model, AuthError> {
        let now = OffsetDateTime::now_utc();
        let created = identity::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            email: Set(claims.email.clone()),
            email_verified: Set(claims.email_verified),
            password: Set(None),
            external_id: Set(Some(subject.to_string())),
            issuer: Set(Some(issuer.to_string())),
            name: Set(claims.name.clone()),
            given_name: Set(claims.given_name.clone()),
            family_name: Set(claims.family_name.clone()),
            picture: Set(claims.picture.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db.as_ref())
        .await;

        match created {
            Ok(created) => {
                tracing::info!(identity_id = %created.id, "created identity from external provider");
                Ok(created)
            }
            Err(e) if is_unique_violation(&e) => {
                tracing::debug!("identity created concurrently, using the existing one");
                self.find_by_external_id(subject, issuer)
                    .await?
                    .ok_or_else(|| AuthError::Internal(format!("identity insert conflicted: {e}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(skip(self, password_hash))]
    async fn create_with_password(
        &self,
        email: &str,
        password_hash: &str,
        issuer: &str,
    ) -> Result<identity::Model, AuthError> {
        let now = OffsetDateTime::now_utc();
        let created = identity::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            email: Set(Some(email.to_string())),
            email_verified: Set(false),
            password: Set(Some(password_hash.to_string())),
            external_id: Set(None),
            issuer: Set(Some(issuer.to_string())),
            name: Set(None),
            given_name: Set(None),
            family_name: Set(None),
            picture: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db.as_ref())
        .await;

        match created {
            Ok(created) => {
                tracing::info!(identity_id = %created.id, "created native identity");
                Ok(created)
            }
            Err(e) if is_unique_violation(&e) => {
                tracing::debug!("native identity created concurrently, using the existing one");
                self.find_by_email(email, issuer)
                    .await?
                    .ok_or_else(|| AuthError::Internal(format!("identity insert conflicted: {e}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Overwrite profile fields with the provider's latest values.
    ///
    /// A verified email stays verified even if a later token omits the claim.
    #[tracing::instrument(skip(self, claims))]
    async fn update_with_claims(
        &self,
        id: &str,
        claims: &ProfileClaims,
    ) -> Result<identity::Model, AuthError> {
        let existing = identity::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| AuthError::Internal(format!("identity {id} vanished during update")))?;

        let keep_verified = existing.email_verified && existing.email == claims.email;
        let mut active: identity::ActiveModel = existing.into();
        active.email = Set(claims.email.clone());
        active.email_verified = Set(claims.email_verified || keep_verified);
        active.name = Set(claims.name.clone());
        active.given_name = Set(claims.given_name.clone());
        active.family_name = Set(claims.family_name.clone());
        active.picture = Set(claims.picture.clone());
        active.updated_at = Set(OffsetDateTime::now_utc());
        Ok(active.update(self.db.as_ref()).await?)
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}
