use super::AUTH_TAG;
use super::extract::BearerIdentity;
use crate::AppResources;
use crate::error::{AuthError, AuthFailure, ErrorResponse};
use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserInfoResponse {
    pub sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub email_verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[utoipa::path(
    get,
    path = "/userinfo",
    tag = AUTH_TAG,
    operation_id = "User Info",
    summary = "Profile of the access token's identity",
    security(("Authorization" = [])),
    responses(
        (status = 200, description = "Identity profile", body = UserInfoResponse),
        (status = 401, description = "Missing, invalid or expired access token", body = ErrorResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn userinfo(
    State(resources): State<AppResources>,
    BearerIdentity(token): BearerIdentity,
) -> Result<Json<UserInfoResponse>, AuthError> {
    let identity = resources
        .identities
        .find_by_id(&token.identity_id)
        .await?
        .ok_or_else(|| {
            tracing::info!("access token names an identity that no longer exists");
            AuthError::AuthenticationFailed(AuthFailure::Unverifiable)
        })?;

    Ok(Json(UserInfoResponse {
        sub: identity.id,
        email: identity.email,
        email_verified: identity.email_verified,
        name: identity.name,
    }))
}
