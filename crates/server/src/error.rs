use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Why a presented credential was rejected.
///
/// Expiry is kept apart from plain invalidity so logs can tell them apart,
/// but both render the same way to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthFailure {
    #[error("cannot be parsed or verified")]
    Unverifiable,
    #[error("token has expired")]
    Expired,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Unsupported grant type: {0}")]
    UnsupportedGrantType(String),
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(AuthFailure),
    #[error("Invalid client: {0}")]
    InvalidClient(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// RFC 6749 §5.2 error code for this failure.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::InvalidInput(_) | AuthError::InvalidRequest(_) => "invalid_request",
            AuthError::UnsupportedGrantType(_) => "unsupported_grant_type",
            AuthError::AuthenticationFailed(_) => "invalid_token",
            AuthError::InvalidClient(_) => "invalid_client",
            AuthError::Internal(_) => "server_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::InvalidInput(_)
            | AuthError::InvalidRequest(_)
            | AuthError::UnsupportedGrantType(_) => StatusCode::BAD_REQUEST,
            AuthError::AuthenticationFailed(_) | AuthError::InvalidClient(_) => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Description that is allowed to cross the trust boundary.
    ///
    /// Internal details never leave the process; token failures collapse into
    /// one wording so callers cannot tell expiry apart.
    pub fn public_description(&self) -> Option<String> {
        match self {
            AuthError::InvalidInput(msg)
            | AuthError::InvalidRequest(msg)
            | AuthError::InvalidClient(msg) => Some(msg.clone()),
            AuthError::UnsupportedGrantType(grant) => {
                Some(format!("the grant type '{grant}' is not supported"))
            }
            AuthError::AuthenticationFailed(_) => {
                Some("the access token is invalid or has expired".to_string())
            }
            AuthError::Internal(_) => None,
        }
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, AuthError::AuthenticationFailed(AuthFailure::Expired))
    }

    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.error_code().to_string(),
            error_description: self.public_description(),
        }
    }
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        AuthError::Internal(format!("database error: {err}"))
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AuthError::Internal(format!("jwt error: {err}"))
    }
}

impl From<bcrypt::BcryptError> for AuthError {
    fn from(err: bcrypt::BcryptError) -> Self {
        AuthError::Internal(format!("password hashing error: {err}"))
    }
}

impl From<getrandom::Error> for AuthError {
    fn from(err: getrandom::Error) -> Self {
        AuthError::Internal(format!("random source error: {err}"))
    }
}

/// RFC 6749 §5.2 error body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: &str, description: Option<&str>) -> Self {
        Self {
            error: error.to_string(),
            error_description: description.map(String::from),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match &self {
            AuthError::Internal(detail) => {
                tracing::error!(error = %detail, "internal error while handling auth request");
            }
            AuthError::AuthenticationFailed(reason) => {
                tracing::debug!(reason = %reason, expired = self.is_expired(), "token rejected");
            }
            other => tracing::debug!(error = %other, "auth request rejected"),
        }
        (self.status(), Json(self.to_error_response())).into_response()
    }
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Timeout while fetching {0}")]
    Timeout(String),
    #[error("HTTP {status} while fetching {url}")]
    Http {
        status: reqwest::StatusCode,
        url: String,
    },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid JSON body from {url}: {reason}")]
    InvalidJson { url: String, reason: String },
    #[error("Discovery document issuer {found} does not match {expected}")]
    IssuerMismatch { expected: String, found: String },
}

impl From<reqwest::Error> for DiscoveryError {
    fn from(err: reqwest::Error) -> Self {
        let url = err.url().map(|u| u.to_string()).unwrap_or_default();
        if err.is_timeout() {
            DiscoveryError::Timeout(url)
        } else if let Some(status) = err.status() {
            DiscoveryError::Http { status, url }
        } else if err.is_decode() {
            DiscoveryError::InvalidJson {
                url,
                reason: err.to_string(),
            }
        } else {
            DiscoveryError::Network(err.to_string())
        }
    }
}

/// One provider's reason for rejecting an ID token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRejection {
    pub provider: String,
    pub client_id: String,
    pub reason: String,
}

impl std::fmt::Display for ProviderRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "provider '{}' (client_id '{}'): {}",
            self.provider, self.client_id, self.reason
        )
    }
}

#[derive(Debug, Error)]
pub enum IdTokenError {
    #[error("ID token has no iss claim")]
    MissingIssuer,
    #[error("ID token cannot be decoded: {0}")]
    Malformed(String),
    #[error("issuer not registered: {0}")]
    IssuerNotRegistered(String),
    #[error("OIDC discovery failed for {issuer}: {source}")]
    Discovery {
        issuer: String,
        #[source]
        source: DiscoveryError,
    },
    #[error("ID token rejected by every provider for this issuer: {}", join_rejections(.0))]
    NoProviderAccepted(Vec<ProviderRejection>),
}

impl IdTokenError {
    /// Providers that were tried before verification gave up.
    pub fn rejections(&self) -> &[ProviderRejection] {
        match self {
            IdTokenError::NoProviderAccepted(r) => r,
            _ => &[],
        }
    }
}

fn join_rejections(rejections: &[ProviderRejection]) -> String {
    rejections
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<IdTokenError> for AuthError {
    fn from(err: IdTokenError) -> Self {
        match err {
            IdTokenError::Discovery { .. } => AuthError::Internal(err.to_string()),
            IdTokenError::MissingIssuer => {
                AuthError::InvalidInput("the id token has no issuer".to_string())
            }
            other => {
                tracing::info!(error = %other, "ID token verification failed");
                AuthError::InvalidClient(
                    "possible causes may be that the id token is invalid, has expired, or has insufficient claims"
                        .to_string(),
                )
            }
        }
    }
}
