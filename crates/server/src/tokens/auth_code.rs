use super::{PkceBinding, delete_returning, generate_secret, hash_token};
use crate::entity::auth_code;
use crate::error::AuthError;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

/// Codes are only good for one minute.
pub const AUTH_CODE_TTL: Duration = Duration::seconds(60);

/// 24 random bytes encode to a 32 character code.
const AUTH_CODE_BYTES: usize = 24;

/// What a successfully consumed code proves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedCode {
    pub identity_id: String,
    pub pkce: Option<PkceBinding>,
}

impl From<auth_code::Model> for ConsumedCode {
    fn from(row: auth_code::Model) -> Self {
        let pkce = row.code_challenge.map(|code_challenge| PkceBinding {
            code_challenge,
            code_challenge_method: row
                .code_challenge_method
                .unwrap_or_else(|| super::pkce::METHOD_S256.to_string()),
            resource: row.resource,
        });
        Self {
            identity_id: row.identity_id,
            pkce,
        }
    }
}

#[derive(Clone)]
pub struct AuthorizationCodeStore {
    db: Arc<DatabaseConnection>,
}

impl AuthorizationCodeStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Mint a code for `identity_id`, optionally bound to a PKCE challenge.
    ///
    /// The plaintext is returned exactly once; only its hash is stored.
    #[tracing::instrument(skip(self, pkce), fields(pkce = pkce.is_some()))]
    pub async fn issue(
        &self,
        identity_id: &str,
        pkce: Option<PkceBinding>,
    ) -> Result<String, AuthError> {
        if identity_id.is_empty() {
            return Err(AuthError::InvalidInput("identity id is required".into()));
        }

        let code = generate_secret(AUTH_CODE_BYTES)?;
        let now = OffsetDateTime::now_utc();
        let (challenge, method, resource) = match pkce {
            Some(p) => (
                Some(p.code_challenge),
                Some(p.code_challenge_method),
                p.resource,
            ),
            None => (None, None, None),
        };

        auth_code::ActiveModel {
            code_hash: Set(hash_token(&code)),
            identity_id: Set(identity_id.to_string()),
            code_challenge: Set(challenge),
            code_challenge_method: Set(method),
            resource: Set(resource),
            expires_at: Set(now + AUTH_CODE_TTL),
            created_at: Set(now),
        }
        .insert(self.db.as_ref())
        .await?;

        Ok(code)
    }

    /// Redeem `code`. Unknown, expired and already consumed codes all yield
    /// `Ok(None)`.
    #[tracing::instrument(skip_all)]
    pub async fn consume(&self, code: &str) -> Result<Option<ConsumedCode>, AuthError> {
        let condition = Condition::all()
            .add(auth_code::Column::CodeHash.eq(hash_token(code)))
            .add(auth_code::Column::ExpiresAt.gte(OffsetDateTime::now_utc()));

        let row = delete_returning::<auth_code::Entity, _>(self.db.as_ref(), condition).await?;
        match row {
            Some(row) => {
                tracing::debug!(identity_id = %row.identity_id, "authorization code consumed");
                Ok(Some(row.into()))
            }
            None => Ok(None),
        }
    }
}
