//! Browser redirect flow against an external provider.
//!
//! The client's `redirect_uri` and `state` travel through the provider inside
//! our own signed, short-lived `state` parameter, so no server-side session
//! is needed.

use super::discovery::Discovery;
use crate::config::{TrustedProvider, normalize_issuer};
use crate::error::{AuthError, DiscoveryError};
use crate::tokens::SigningKey;
use jsonwebtoken::{Algorithm, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use url::Url;

/// How long a user may spend at the provider before the flow expires.
const FLOW_TTL: Duration = Duration::minutes(10);

const SCOPES: &str = "openid email profile";

/// `aud` of a signed flow state. Access tokens share the signing key, so
/// `open_state` refuses anything without it.
const FLOW_STATE_AUDIENCE: &str = "flow-state";

/// Carried through the provider in the `state` parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowState {
    pub provider: String,
    pub redirect_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub aud: String,
    pub exp: i64,
}

#[derive(Debug, Deserialize)]
struct ProviderTokenResponse {
    #[serde(default)]
    id_token: Option<String>,
}

#[derive(Clone)]
pub struct RelyingParty {
    discovery: Discovery,
    key: Arc<SigningKey>,
    public_url: String,
}

impl RelyingParty {
    /// `public_url` is where this service is reachable; callback URLs hang off it.
    pub fn new(discovery: Discovery, key: Arc<SigningKey>, public_url: impl Into<String>) -> Self {
        Self {
            discovery,
            key,
            public_url: public_url.into(),
        }
    }

    pub fn authorize_path(provider: &str) -> String {
        format!("/auth/authorize/{provider}")
    }

    pub fn callback_url(&self, provider: &str) -> String {
        format!(
            "{}/auth/callback/{provider}",
            normalize_issuer(&self.public_url)
        )
    }

    /// URL at the provider the user agent is sent to.
    #[tracing::instrument(skip(self, client_state), fields(provider = %provider.name))]
    pub async fn authorization_url(
        &self,
        provider: &TrustedProvider,
        redirect_uri: &str,
        client_state: Option<String>,
    ) -> Result<Url, AuthError> {
        let metadata = self
            .discovery
            .metadata(&provider.issuer_url)
            .await
            .map_err(|e| discovery_failed(provider, e))?;

        let flow = FlowState {
            provider: provider.name.clone(),
            redirect_uri: redirect_uri.to_string(),
            state: client_state,
            aud: FLOW_STATE_AUDIENCE.to_string(),
            exp: (OffsetDateTime::now_utc() + FLOW_TTL).unix_timestamp(),
        };
        let signed_state = self.key.sign(&flow)?;

        let mut url = Url::parse(&metadata.authorization_endpoint).map_err(|e| {
            AuthError::Internal(format!(
                "provider '{}' advertises an invalid authorization_endpoint: {e}",
                provider.name
            ))
        })?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &provider.client_id)
            .append_pair("redirect_uri", &self.callback_url(&provider.name))
            .append_pair("scope", SCOPES)
            .append_pair("state", &signed_state);
        Ok(url)
    }

    /// Check the `state` returned by the provider and recover the client's
    /// original redirect target.
    pub fn open_state(&self, provider: &str, signed_state: &str) -> Result<FlowState, AuthError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[FLOW_STATE_AUDIENCE]);
        validation.set_required_spec_claims(&["exp", "aud"]);

        let flow: FlowState = self.key.verify(signed_state, &validation).map_err(|e| {
            tracing::debug!(error = %e, "callback state rejected");
            AuthError::InvalidRequest("invalid or expired state".into())
        })?;
        if flow.provider != provider {
            return Err(AuthError::InvalidRequest("invalid or expired state".into()));
        }
        Ok(flow)
    }

    /// Redeem the provider's authorization code for its ID token.
    #[tracing::instrument(skip(self, code), fields(provider = %provider.name))]
    pub async fn exchange_code(
        &self,
        provider: &TrustedProvider,
        code: &str,
    ) -> Result<String, AuthError> {
        let metadata = self
            .discovery
            .metadata(&provider.issuer_url)
            .await
            .map_err(|e| discovery_failed(provider, e))?;

        let callback = self.callback_url(&provider.name);
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", callback.as_str()),
            ("client_id", provider.client_id.as_str()),
        ];
        if let Some(secret) = provider.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }

        let response = self
            .discovery
            .http()
            .post(&metadata.token_endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| discovery_failed(provider, e.into()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::info!(status = %status, "provider refused the authorization code");
            return Err(AuthError::InvalidClient(
                "the identity provider rejected the authorization code".into(),
            ));
        }

        let body: ProviderTokenResponse = response.json().await.map_err(|e| {
            discovery_failed(
                provider,
                DiscoveryError::InvalidJson {
                    url: metadata.token_endpoint.clone(),
                    reason: e.to_string(),
                },
            )
        })?;
        body.id_token.ok_or_else(|| {
            AuthError::InvalidClient("the identity provider did not return an id token".into())
        })
    }
}

fn discovery_failed(provider: &TrustedProvider, err: DiscoveryError) -> AuthError {
    AuthError::Internal(format!("provider '{}': {err}", provider.name))
}
