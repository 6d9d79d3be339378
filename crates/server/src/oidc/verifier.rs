use super::claims::IdTokenClaims;
use super::discovery::Discovery;
use crate::config::TrustedProvider;
use crate::error::{IdTokenError, ProviderRejection};
use jsonwebtoken::jwk::{Jwk, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use std::sync::Arc;

/// An ID token accepted by one of the configured providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdToken {
    pub provider: String,
    pub claims: IdTokenClaims,
}

/// Verifies ID tokens against every configured provider that shares the
/// token's issuer.
#[derive(Clone)]
pub struct IdVerifier {
    providers: Arc<Vec<TrustedProvider>>,
    discovery: Discovery,
}

impl IdVerifier {
    pub fn new(providers: Vec<TrustedProvider>, discovery: Discovery) -> Self {
        Self {
            providers: Arc::new(providers),
            discovery,
        }
    }

    #[tracing::instrument(skip_all)]
    pub async fn verify(&self, raw: &str) -> Result<IdToken, IdTokenError> {
        let issuer = unverified_issuer(raw)?;
        let candidates: Vec<&TrustedProvider> = self
            .providers
            .iter()
            .filter(|p| p.matches_issuer(&issuer))
            .collect();
        if candidates.is_empty() {
            return Err(IdTokenError::IssuerNotRegistered(issuer));
        }

        let header = decode_header(raw).map_err(|e| IdTokenError::Malformed(e.to_string()))?;
        let jwk = self
            .discovery
            .signing_key(&issuer, header.kid.as_deref())
            .await
            .map_err(|source| IdTokenError::Discovery {
                issuer: issuer.clone(),
                source,
            })?;
        let key = match jwk.as_ref().map(DecodingKey::from_jwk) {
            Some(Ok(key)) => Some(key),
            Some(Err(e)) => {
                tracing::warn!(issuer = %issuer, error = %e, "provider published an unusable key");
                None
            }
            None => None,
        };
        let algorithm = jwk.as_ref().and_then(allowed_algorithm);

        let mut rejections = Vec::with_capacity(candidates.len());
        for provider in candidates {
            let Some(key) = key.as_ref() else {
                rejections.push(rejection(provider, "no signing key matches the token's kid"));
                continue;
            };
            let Some(algorithm) = algorithm else {
                rejections.push(rejection(provider, "signing key names an unsupported algorithm"));
                continue;
            };

            let mut validation = Validation::new(algorithm);
            validation.set_issuer(&[issuer.as_str()]);
            validation.set_audience(&[provider.client_id.as_str()]);
            validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

            match decode::<IdTokenClaims>(raw, key, &validation) {
                Ok(data) => {
                    tracing::debug!(provider = %provider.name, sub = %data.claims.sub, "ID token accepted");
                    return Ok(IdToken {
                        provider: provider.name.clone(),
                        claims: data.claims,
                    });
                }
                Err(e) => rejections.push(rejection(provider, &e.to_string())),
            }
        }

        Err(IdTokenError::NoProviderAccepted(rejections))
    }
}

fn rejection(provider: &TrustedProvider, reason: &str) -> ProviderRejection {
    ProviderRejection {
        provider: provider.name.clone(),
        client_id: provider.client_id.clone(),
        reason: reason.to_string(),
    }
}

/// The only algorithm a token signed with `jwk` may use: the key's own `alg`,
/// or RS256 when it publishes none. Symmetric and encryption algorithms are
/// never accepted.
fn allowed_algorithm(jwk: &Jwk) -> Option<Algorithm> {
    let Some(alg) = jwk.common.key_algorithm.as_ref() else {
        return Some(Algorithm::RS256);
    };
    match alg {
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    }
}

/// Read `iss` without checking the signature; only used to pick providers.
fn unverified_issuer(raw: &str) -> Result<String, IdTokenError> {
    #[derive(Deserialize)]
    struct IssuerOnly {
        #[serde(default)]
        iss: Option<String>,
    }

    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<IssuerOnly>(raw, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|e| IdTokenError::Malformed(e.to_string()))?;
    match data.claims.iss {
        Some(iss) if !iss.trim().is_empty() => Ok(iss),
        _ => Err(IdTokenError::MissingIssuer),
    }
}
