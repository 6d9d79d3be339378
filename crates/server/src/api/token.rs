//! `POST /auth/token` and `POST /auth/revoke`.

use super::AUTH_TAG;
use super::extract::JsonOrForm;
use crate::AppResources;
use crate::error::{AuthError, ErrorResponse};
use crate::grant::{Grant, TokenRequest, TokenResponse};
use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RevokeRequest {
    #[serde(default)]
    pub token: String,
}

#[utoipa::path(
    post,
    path = "/token",
    tag = AUTH_TAG,
    operation_id = "Token",
    summary = "Exchange a grant for tokens",
    description = "Supported grant types:\n\
                   - `authorization_code`: redeem a code from `/auth/authorize` or a provider callback. \
                   Codes issued with a PKCE challenge need `code_verifier`.\n\
                   - `refresh_token`: rotate a refresh token.\n\
                   - `password`: native sign-in; an unknown email registers a new identity.\n\
                   - `token_exchange` / `urn:ietf:params:oauth:grant-type:token-exchange`: \
                   exchange a trusted provider's ID token.\n\n\
                   Accepts JSON or form-urlencoded bodies.",
    request_body(
        content = TokenRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Token request parameters"
    ),
    responses(
        (status = 200, description = "Tokens issued", body = TokenResponse),
        (status = 400, description = "Malformed request or unsupported grant type", body = ErrorResponse),
        (status = 401, description = "Code, refresh token, password or ID token rejected", body = ErrorResponse),
        (status = 405, description = "Method other than POST", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn token(
    State(resources): State<AppResources>,
    JsonOrForm(request): JsonOrForm<TokenRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let grant = Grant::try_from(request)?;
    let response = resources.token_endpoint.exchange(grant).await?;
    Ok((
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(response),
    ))
}

/// Revocation never reveals whether the token existed (RFC 7009).
#[utoipa::path(
    post,
    path = "/revoke",
    tag = AUTH_TAG,
    operation_id = "Revoke",
    summary = "Revoke a refresh token",
    description = "Deletes the refresh token if it exists. Always answers 200, \
                   including for unknown, expired or already revoked tokens.",
    request_body(
        content = RevokeRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Token revocation request"
    ),
    responses(
        (status = 200, description = "Token revoked or already unusable"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn revoke(
    State(resources): State<AppResources>,
    request: Result<JsonOrForm<RevokeRequest>, AuthError>,
) -> StatusCode {
    let token = match request {
        Ok(JsonOrForm(body)) => body.token,
        Err(e) => {
            tracing::debug!(error = %e, "unreadable revocation request");
            return StatusCode::OK;
        }
    };
    if token.is_empty() {
        return StatusCode::OK;
    }
    if let Err(e) = resources.refresh_tokens.revoke(&token).await {
        tracing::warn!(error = %e, "refresh token revocation failed");
    }
    StatusCode::OK
}

/// Fallback for known paths hit with the wrong method.
pub async fn method_not_allowed() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(ErrorResponse::new(
            "invalid_request",
            Some("method not allowed"),
        )),
    )
}
