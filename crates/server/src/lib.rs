//! OAuth 2.1 / OpenID Connect token lifecycle service.
//!
//! Issues, verifies, rotates and revokes the credentials a client uses to
//! prove who it is: single-use authorization codes, rotating refresh tokens
//! and stateless RS256 access tokens. Third-party ID tokens from configured
//! providers are verified through OIDC discovery and can be exchanged for
//! this service's own tokens.

use std::sync::Arc;
use std::time::Duration;

use sea_orm::DatabaseConnection;

use crate::config::{AuthConfig, ConfigError};
use crate::grant::TokenEndpoint;
use crate::identity::{DbIdentityStore, IdentityStore};
use crate::oidc::{Discovery, IdVerifier, RelyingParty};
use crate::tokens::{AccessTokenIssuer, AuthorizationCodeStore, RefreshTokenStore, SigningKey};

pub mod api;
pub mod cache;
pub mod config;
pub mod entity;
pub mod error;
pub mod grant;
pub mod identity;
pub mod oidc;
pub mod password;
pub mod tokens;

/// Everything a request handler needs, cheap to clone.
#[derive(Clone)]
pub struct AppResources {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AuthConfig>,
    pub codes: AuthorizationCodeStore,
    pub refresh_tokens: RefreshTokenStore,
    pub access_tokens: AccessTokenIssuer,
    pub identities: Arc<dyn IdentityStore>,
    pub relying_party: RelyingParty,
    pub token_endpoint: TokenEndpoint,
}

impl AppResources {
    /// Wire up the token services from configuration.
    ///
    /// Fails if the signing key cannot be parsed, so a misconfigured key stops
    /// startup instead of failing every request.
    pub fn new(db: Arc<DatabaseConnection>, config: AuthConfig) -> Result<Self, ConfigError> {
        let identities: Arc<dyn IdentityStore> = Arc::new(DbIdentityStore::new(db.clone()));
        Self::with_identity_store(db, config, identities)
    }

    pub fn with_identity_store(
        db: Arc<DatabaseConnection>,
        config: AuthConfig,
        identities: Arc<dyn IdentityStore>,
    ) -> Result<Self, ConfigError> {
        let key = Arc::new(SigningKey::from_pem(&config.private_key_pem)?);
        let discovery = Discovery::new(
            Duration::from_secs(config.discovery_timeout_secs),
            Duration::from_secs(config.discovery_cache_ttl_secs),
        )
        .map_err(|e| ConfigError::Validation(format!("cannot build discovery client: {e}")))?;

        let codes = AuthorizationCodeStore::new(db.clone());
        let refresh_tokens = RefreshTokenStore::with_ttl(
            db.clone(),
            time::Duration::seconds(config.refresh_token_ttl),
        );
        let access_tokens = AccessTokenIssuer::new(
            key.clone(),
            config.issuer_url.clone(),
            time::Duration::seconds(config.access_token_ttl),
        );
        let id_verifier = IdVerifier::new(config.providers.clone(), discovery.clone());
        let relying_party = RelyingParty::new(discovery, key, config.issuer_url.clone());
        let token_endpoint = TokenEndpoint::new(
            codes.clone(),
            refresh_tokens.clone(),
            access_tokens.clone(),
            id_verifier,
            identities.clone(),
        )
        .with_refresh_token_rotation(config.refresh_token_rotation)
        .with_password_hash_cost(config.password_hash_cost);

        tracing::info!(
            issuer = %config.issuer_url,
            providers = config.providers.len(),
            rotation = config.refresh_token_rotation,
            "token services ready"
        );

        Ok(Self {
            db,
            config: Arc::new(config),
            codes,
            refresh_tokens,
            access_tokens,
            identities,
            relying_party,
            token_endpoint,
        })
    }
}
