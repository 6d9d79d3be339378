//! Token endpoint grant handling.
//!
//! A raw [`TokenRequest`] is parsed into a typed [`Grant`] first, so every
//! grant branch only ever sees the fields it needs, already checked for
//! presence.

use crate::error::AuthError;
use crate::identity::IdentityStore;
use crate::oidc::IdVerifier;
use crate::password::{hash_password, is_valid_email, verify_password};
use crate::tokens::{AccessTokenIssuer, AuthorizationCodeStore, RefreshTokenStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";
pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";
pub const GRANT_PASSWORD: &str = "password";
pub const GRANT_TOKEN_EXCHANGE: &str = "token_exchange";
pub const GRANT_TOKEN_EXCHANGE_URN: &str = "urn:ietf:params:oauth:grant-type:token-exchange";

const TOKEN_TYPE_ID_TOKEN: [&str; 2] = ["id_token", "urn:ietf:params:oauth:token-type:id_token"];
const TOKEN_TYPE_ACCESS_TOKEN: [&str; 2] = [
    "access_token",
    "urn:ietf:params:oauth:token-type:access_token",
];

/// Body of `POST /auth/token`, accepted as JSON or form data.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct TokenRequest {
    pub grant_type: String,
    pub code: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub subject_token: Option<String>,
    pub subject_token_type: Option<String>,
    pub requested_token_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    AuthorizationCode {
        code: String,
        code_verifier: Option<String>,
    },
    RefreshToken {
        refresh_token: String,
    },
    Password {
        username: String,
        password: String,
    },
    TokenExchange {
        subject_token: String,
    },
}

impl Grant {
    pub fn kind(&self) -> &'static str {
        match self {
            Grant::AuthorizationCode { .. } => GRANT_AUTHORIZATION_CODE,
            Grant::RefreshToken { .. } => GRANT_REFRESH_TOKEN,
            Grant::Password { .. } => GRANT_PASSWORD,
            Grant::TokenExchange { .. } => GRANT_TOKEN_EXCHANGE,
        }
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, AuthError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AuthError::InvalidInput(format!("{field} is required"))),
    }
}

impl TryFrom<TokenRequest> for Grant {
    type Error = AuthError;

    fn try_from(req: TokenRequest) -> Result<Self, Self::Error> {
        match req.grant_type.as_str() {
            GRANT_AUTHORIZATION_CODE => Ok(Grant::AuthorizationCode {
                code: required(req.code, "code")?,
                code_verifier: req.code_verifier,
            }),
            GRANT_REFRESH_TOKEN => Ok(Grant::RefreshToken {
                refresh_token: required(req.refresh_token, "refresh_token")?,
            }),
            GRANT_PASSWORD => {
                let username = required(req.username, "username")?;
                if !is_valid_email(&username) {
                    return Err(AuthError::InvalidInput(
                        "username must be a valid email address".into(),
                    ));
                }
                Ok(Grant::Password {
                    username: username.to_ascii_lowercase(),
                    password: required(req.password, "password")?,
                })
            }
            GRANT_TOKEN_EXCHANGE | GRANT_TOKEN_EXCHANGE_URN => {
                if let Some(kind) = req.subject_token_type.as_deref() {
                    if !TOKEN_TYPE_ID_TOKEN.contains(&kind) {
                        return Err(AuthError::InvalidRequest(format!(
                            "unsupported subject_token_type '{kind}'"
                        )));
                    }
                }
                if let Some(kind) = req.requested_token_type.as_deref() {
                    if !TOKEN_TYPE_ACCESS_TOKEN.contains(&kind) {
                        return Err(AuthError::InvalidRequest(format!(
                            "unsupported requested_token_type '{kind}'"
                        )));
                    }
                }
                Ok(Grant::TokenExchange {
                    subject_token: required(req.subject_token, "subject_token")?,
                })
            }
            other => Err(AuthError::UnsupportedGrantType(other.to_string())),
        }
    }
}

/// Turns grants into tokens.
///
/// Holds no per-request state; one instance serves all requests.
#[derive(Clone)]
pub struct TokenEndpoint {
    codes: AuthorizationCodeStore,
    refresh_tokens: RefreshTokenStore,
    access_tokens: AccessTokenIssuer,
    id_verifier: IdVerifier,
    identities: Arc<dyn IdentityStore>,
    rotate_refresh_tokens: bool,
    password_hash_cost: u32,
}

impl TokenEndpoint {
    pub fn new(
        codes: AuthorizationCodeStore,
        refresh_tokens: RefreshTokenStore,
        access_tokens: AccessTokenIssuer,
        id_verifier: IdVerifier,
        identities: Arc<dyn IdentityStore>,
    ) -> Self {
        Self {
            codes,
            refresh_tokens,
            access_tokens,
            id_verifier,
            identities,
            rotate_refresh_tokens: true,
            password_hash_cost: bcrypt::DEFAULT_COST,
        }
    }

    /// With rotation off, a refresh grant returns the presented token unchanged.
    pub fn with_refresh_token_rotation(mut self, enabled: bool) -> Self {
        self.rotate_refresh_tokens = enabled;
        self
    }

    pub fn with_password_hash_cost(mut self, cost: u32) -> Self {
        self.password_hash_cost = cost;
        self
    }

    /// Issuer of native identities, the same as the access token issuer.
    pub fn native_issuer(&self) -> &str {
        self.access_tokens.issuer()
    }

    #[tracing::instrument(skip_all, fields(grant_type = grant.kind()))]
    pub async fn exchange(&self, grant: Grant) -> Result<TokenResponse, AuthError> {
        match grant {
            Grant::AuthorizationCode {
                code,
                code_verifier,
            } => self.authorization_code(&code, code_verifier.as_deref()).await,
            Grant::RefreshToken { refresh_token } => self.refresh(&refresh_token).await,
            Grant::Password { username, password } => self.password(&username, &password).await,
            Grant::TokenExchange { subject_token } => self.token_exchange(&subject_token).await,
        }
    }

    async fn authorization_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenResponse, AuthError> {
        let consumed = self
            .codes
            .consume(code)
            .await?
            .ok_or_else(|| AuthError::InvalidClient("invalid authorization code".into()))?;

        let resource = match consumed.pkce {
            Some(pkce) => {
                let verifier = code_verifier
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| AuthError::InvalidRequest("code_verifier is required".into()))?;
                if !pkce.verify(verifier) {
                    return Err(AuthError::InvalidRequest("invalid code_verifier".into()));
                }
                pkce.resource
            }
            None => None,
        };

        let refresh_token = self.refresh_tokens.issue(&consumed.identity_id).await?;
        self.respond(&consumed.identity_id, Some(refresh_token), resource.as_deref())
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        let invalid = || AuthError::InvalidClient("invalid refresh token".into());

        let (identity_id, token) = if self.rotate_refresh_tokens {
            let rotated = self.refresh_tokens.rotate(refresh_token).await?.ok_or_else(invalid)?;
            (rotated.identity_id, rotated.token)
        } else {
            let identity_id = self
                .refresh_tokens
                .validate(refresh_token)
                .await?
                .ok_or_else(invalid)?;
            (identity_id, refresh_token.to_string())
        };

        self.respond(&identity_id, Some(token), None)
    }

    async fn password(&self, email: &str, password: &str) -> Result<TokenResponse, AuthError> {
        let identity_id = self.authenticate_password(email, password).await?;
        let refresh_token = self.refresh_tokens.issue(&identity_id).await?;
        self.respond(&identity_id, Some(refresh_token), None)
    }

    async fn token_exchange(&self, subject_token: &str) -> Result<TokenResponse, AuthError> {
        let identity_id = self.sign_in_with_id_token(subject_token).await?;
        let refresh_token = self.refresh_tokens.issue(&identity_id).await?;
        self.respond(&identity_id, Some(refresh_token), None)
    }

    /// Native sign-in: an unknown email registers a new identity with this
    /// password, a known one must match its stored hash.
    ///
    /// Two concurrent first sign-ins for one email resolve to a single
    /// identity; the one whose registration lost is checked against the
    /// winner's password.
    #[tracing::instrument(skip(self, password))]
    pub async fn authenticate_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<String, AuthError> {
        let invalid = || AuthError::InvalidClient("invalid username or password".into());
        let issuer = self.native_issuer();

        match self.identities.find_by_email(email, issuer).await? {
            Some(identity) => {
                let Some(stored) = identity.password.as_deref() else {
                    return Err(invalid());
                };
                if !verify_password(password, stored).await? {
                    return Err(invalid());
                }
                Ok(identity.id)
            }
            None => {
                let hash = hash_password(password, self.password_hash_cost).await?;
                let created = self
                    .identities
                    .create_with_password(email, &hash, issuer)
                    .await?;
                let Some(stored) = created.password.as_deref() else {
                    return Err(invalid());
                };
                if stored == hash || verify_password(password, stored).await? {
                    Ok(created.id)
                } else {
                    Err(invalid())
                }
            }
        }
    }

    /// Verify a third-party ID token and find or create the identity it
    /// names, refreshing stored profile claims on the way.
    #[tracing::instrument(skip_all)]
    pub async fn sign_in_with_id_token(&self, raw: &str) -> Result<String, AuthError> {
        let verified = self.id_verifier.verify(raw).await?;
        let claims = &verified.claims;
        let profile = claims.profile();

        let identity = match self
            .identities
            .find_by_external_id(&claims.sub, &claims.iss)
            .await?
        {
            Some(existing) => {
                self.identities
                    .update_with_claims(&existing.id, &profile)
                    .await?
            }
            None => {
                self.identities
                    .create_with_claims(&claims.sub, &claims.iss, &profile)
                    .await?
            }
        };
        tracing::debug!(provider = %verified.provider, identity_id = %identity.id, "ID token sign-in");
        Ok(identity.id)
    }

    fn respond(
        &self,
        identity_id: &str,
        refresh_token: Option<String>,
        resource: Option<&str>,
    ) -> Result<TokenResponse, AuthError> {
        let access = match resource {
            Some(resource) => self.access_tokens.generate_for_resource(identity_id, resource)?,
            None => self.access_tokens.generate(identity_id)?,
        };
        Ok(TokenResponse {
            access_token: access.token,
            token_type: "bearer".to_string(),
            expires_in: access.expires_in.whole_seconds(),
            refresh_token,
        })
    }
}
