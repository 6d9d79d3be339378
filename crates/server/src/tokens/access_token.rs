//! Stateless RS256 access tokens.

use crate::config::{ConfigError, DEFAULT_ACCESS_TOKEN_TTL};
use crate::error::{AuthError, AuthFailure};
use base64::Engine;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rsa::RsaPrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

/// RSA key pair used to sign and verify access tokens.
pub struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKey {
    /// Parse a PKCS#8 (`BEGIN PRIVATE KEY`) or PKCS#1 (`BEGIN RSA PRIVATE KEY`)
    /// PEM and derive the verification key from it.
    pub fn from_pem(pem: &str) -> Result<Self, ConfigError> {
        let private = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| ConfigError::Validation(format!("unreadable RSA private key: {e}")))?;

        let b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let n = b64.encode(private.n().to_bytes_be());
        let e = b64.encode(private.e().to_bytes_be());

        let encoding = EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| ConfigError::Validation(format!("unusable RSA signing key: {e}")))?;
        let decoding = DecodingKey::from_rsa_components(&n, &e)
            .map_err(|e| ConfigError::Validation(format!("unusable RSA public key: {e}")))?;

        Ok(Self { encoding, decoding })
    }

    /// Sign arbitrary claims with RS256.
    pub fn sign<C: Serialize>(&self, claims: &C) -> Result<String, AuthError> {
        Ok(encode(&Header::new(Algorithm::RS256), claims, &self.encoding)?)
    }

    pub fn verify<C: DeserializeOwned>(
        &self,
        jwt: &str,
        validation: &Validation,
    ) -> jsonwebtoken::errors::Result<C> {
        decode::<C>(jwt, &self.decoding, validation).map(|data| data.claims)
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningKey(..)")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub iss: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_in: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedAccessToken {
    pub identity_id: String,
    pub issuer: String,
}

#[derive(Clone, Debug)]
pub struct AccessTokenIssuer {
    key: Arc<SigningKey>,
    issuer: String,
    ttl: Duration,
}

impl AccessTokenIssuer {
    pub fn new(key: Arc<SigningKey>, issuer: impl Into<String>, ttl: Duration) -> Self {
        Self {
            key,
            issuer: issuer.into(),
            ttl,
        }
    }

    /// Issuer with the default one hour lifetime.
    pub fn with_default_ttl(key: Arc<SigningKey>, issuer: impl Into<String>) -> Self {
        Self::new(key, issuer, Duration::seconds(DEFAULT_ACCESS_TOKEN_TTL))
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[tracing::instrument(skip(self))]
    pub fn generate(&self, identity_id: &str) -> Result<AccessToken, AuthError> {
        self.sign(identity_id, None)
    }

    /// Like [`Self::generate`] but with `aud` set to `resource`.
    #[tracing::instrument(skip(self))]
    pub fn generate_for_resource(
        &self,
        identity_id: &str,
        resource: &str,
    ) -> Result<AccessToken, AuthError> {
        self.sign(identity_id, Some(resource))
    }

    fn sign(&self, identity_id: &str, audience: Option<&str>) -> Result<AccessToken, AuthError> {
        if identity_id.is_empty() {
            return Err(AuthError::InvalidInput("identity id is required".into()));
        }
        let now = OffsetDateTime::now_utc();
        let claims = AccessClaims {
            sub: identity_id.to_string(),
            iss: self.issuer.clone(),
            aud: audience.map(String::from),
            iat: now.unix_timestamp(),
            exp: (now + self.ttl).unix_timestamp(),
        };
        let token = self.key.sign(&claims)?;
        Ok(AccessToken {
            token,
            expires_in: self.ttl,
        })
    }

    /// Verify signature and expiry of `jwt`.
    ///
    /// Expiry is checked here rather than by `jsonwebtoken` so an expired but
    /// authentic token is reported as [`AuthFailure::Expired`].
    pub fn validate(&self, jwt: &str) -> Result<ValidatedAccessToken, AuthError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub", "iss"]);

        let claims: AccessClaims = self.key.verify(jwt, &validation).map_err(|e| {
            tracing::debug!(error = %e, "access token failed verification");
            AuthError::AuthenticationFailed(AuthFailure::Unverifiable)
        })?;

        if claims.exp < OffsetDateTime::now_utc().unix_timestamp() {
            return Err(AuthError::AuthenticationFailed(AuthFailure::Expired));
        }

        Ok(ValidatedAccessToken {
            identity_id: claims.sub,
            issuer: claims.iss,
        })
    }
}
