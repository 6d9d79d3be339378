//! Request extractors shared by the auth endpoints.

use crate::AppResources;
use crate::error::{AuthError, AuthFailure};
use crate::tokens::ValidatedAccessToken;
use axum::{
    Form, Json,
    extract::{FromRequest, FromRequestParts, Request},
    http::{header, request::Parts},
};
use serde::de::DeserializeOwned;

/// Body accepted as `application/json` or form-urlencoded, picked by
/// `Content-Type`.
pub struct JsonOrForm<T>(pub T);

impl<S, T> FromRequest<S> for JsonOrForm<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = AuthError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.trim_start().starts_with("application/json"));

        if is_json {
            Json::<T>::from_request(req, state)
                .await
                .map(|Json(body)| Self(body))
                .map_err(|e| AuthError::InvalidInput(e.body_text()))
        } else {
            Form::<T>::from_request(req, state)
                .await
                .map(|Form(body)| Self(body))
                .map_err(|e| AuthError::InvalidInput(e.body_text()))
        }
    }
}

/// A request carrying a valid `Authorization: Bearer <access token>`.
///
/// ```ignore
/// async fn handler(BearerIdentity(token): BearerIdentity) -> String {
///     token.identity_id
/// }
/// ```
pub struct BearerIdentity(pub ValidatedAccessToken);

impl FromRequestParts<AppResources> for BearerIdentity {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        resources: &AppResources,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::AuthenticationFailed(AuthFailure::Unverifiable))?;

        let token = match header.split_once(' ') {
            Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => token.trim(),
            _ => return Err(AuthError::AuthenticationFailed(AuthFailure::Unverifiable)),
        };

        resources.access_tokens.validate(token).map(BearerIdentity)
    }
}
