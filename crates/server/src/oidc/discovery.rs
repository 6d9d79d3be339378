//! OpenID Connect discovery and JWKS retrieval.

use crate::cache::TtlCache;
use crate::config::normalize_issuer;
use crate::error::DiscoveryError;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// The subset of a provider's discovery document this service uses.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
}

pub fn discovery_url(issuer: &str) -> String {
    format!(
        "{}/.well-known/openid-configuration",
        normalize_issuer(issuer)
    )
}

/// Fetches and caches provider metadata (keyed by issuer) and key sets
/// (keyed by `jwks_uri`).
#[derive(Clone)]
pub struct Discovery {
    http: reqwest::Client,
    metadata: TtlCache<String, Arc<ProviderMetadata>>,
    jwks: TtlCache<String, Arc<JwkSet>>,
}

impl Discovery {
    pub fn new(timeout: Duration, cache_ttl: Duration) -> Result<Self, DiscoveryError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DiscoveryError::Network(e.to_string()))?;
        Ok(Self {
            http,
            metadata: TtlCache::new(cache_ttl),
            jwks: TtlCache::new(cache_ttl),
        })
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    #[tracing::instrument(skip(self))]
    pub async fn metadata(&self, issuer: &str) -> Result<Arc<ProviderMetadata>, DiscoveryError> {
        let key = normalize_issuer(issuer).to_string();
        if let Some(hit) = self.metadata.get(&key) {
            return Ok(hit);
        }

        let doc: ProviderMetadata = self.fetch_json(&discovery_url(issuer)).await?;
        if normalize_issuer(&doc.issuer) != key {
            return Err(DiscoveryError::IssuerMismatch {
                expected: key,
                found: doc.issuer,
            });
        }

        let doc = Arc::new(doc);
        self.metadata.insert(key, doc.clone());
        Ok(doc)
    }

    async fn jwks(&self, jwks_uri: &str, refresh: bool) -> Result<Arc<JwkSet>, DiscoveryError> {
        let key = jwks_uri.to_string();
        if !refresh {
            if let Some(hit) = self.jwks.get(&key) {
                return Ok(hit);
            }
        }
        let set = Arc::new(self.fetch_json::<JwkSet>(jwks_uri).await?);
        self.jwks.insert(key, set.clone());
        Ok(set)
    }

    /// Signing key for `kid` from the issuer's JWKS.
    ///
    /// A cached set that lacks `kid` is refetched once, so provider key
    /// rotation is picked up without waiting for the TTL. Without a `kid` the
    /// set must hold exactly one key.
    #[tracing::instrument(skip(self))]
    pub async fn signing_key(
        &self,
        issuer: &str,
        kid: Option<&str>,
    ) -> Result<Option<Jwk>, DiscoveryError> {
        let metadata = self.metadata(issuer).await?;
        let set = self.jwks(&metadata.jwks_uri, false).await?;
        if let Some(jwk) = select_key(&set, kid) {
            return Ok(Some(jwk));
        }

        tracing::debug!(jwks_uri = %metadata.jwks_uri, "no matching key in cached JWKS, refetching");
        let set = self.jwks(&metadata.jwks_uri, true).await?;
        Ok(select_key(&set, kid))
    }

    async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, DiscoveryError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::Http {
                status,
                url: url.to_string(),
            });
        }
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| DiscoveryError::InvalidJson {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

fn select_key(set: &JwkSet, kid: Option<&str>) -> Option<Jwk> {
    match kid {
        Some(kid) => set.find(kid).cloned(),
        None if set.keys.len() == 1 => set.keys.first().cloned(),
        None => None,
    }
}
