//! Browser-facing authorization flows.
//!
//! - `POST /auth/authorize`: native sign-in with PKCE, answers with a code.
//! - `GET /auth/authorize/{provider}`: send the user to an external provider.
//! - `GET /auth/callback/{provider}`: the provider sends the user back here.
//!
//! Until the client's `redirect_uri` is known to be on the allow-list errors
//! are plain JSON 400s; after that they travel back on the redirect.

use super::AUTH_TAG;
use crate::AppResources;
use crate::config::AuthConfig;
use crate::error::{AuthError, ErrorResponse};
use crate::oidc::RelyingParty;
use crate::password::is_valid_email;
use crate::tokens::PkceBinding;
use crate::tokens::pkce::{METHOD_S256, is_well_formed_challenge};
use axum::{
    Form, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::{IntoParams, ToSchema};

/// Native authorization request. Credentials are posted by the login form.
#[derive(Debug, Deserialize, ToSchema)]
pub struct NativeAuthorizeRequest {
    /// Must be `code`
    pub response_type: String,
    pub redirect_uri: Option<String>,
    /// Opaque value echoed back on the redirect
    pub state: Option<String>,
    /// `BASE64URL(SHA256(code_verifier))`
    pub code_challenge: Option<String>,
    /// Must be `S256`
    pub code_challenge_method: Option<String>,
    /// Resource indicator (RFC 8707) the access token will be scoped to
    pub resource: Option<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ProviderAuthorizeParams {
    pub redirect_uri: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProviderInfo {
    pub name: String,
    pub issuer: String,
    pub authorize_url: String,
    pub callback_url: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProvidersResponse {
    /// Issuer of native identities and of every access token
    pub issuer: String,
    pub providers: Vec<ProviderInfo>,
}

#[utoipa::path(
    post,
    path = "/authorize",
    tag = AUTH_TAG,
    operation_id = "Native Authorize",
    summary = "Sign in with email and password, PKCE required",
    description = "Authenticates the posted credentials and redirects to `redirect_uri` with a \
                   single-use authorization code bound to the PKCE challenge. Only `S256` is \
                   accepted. Unknown emails are registered on first use.",
    request_body(
        content = NativeAuthorizeRequest,
        content_type = "application/x-www-form-urlencoded",
    ),
    responses(
        (status = 303, description = "Redirect back to the client with `code` and `state`, or with `error`"),
        (status = 400, description = "Missing or untrusted redirect_uri", body = ErrorResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn native_authorize(
    State(resources): State<AppResources>,
    Form(request): Form<NativeAuthorizeRequest>,
) -> Response {
    let redirect = match trusted_redirect(&resources.config, request.redirect_uri.as_deref()) {
        Ok(url) => url,
        Err(response) => return response,
    };
    let state = request.state.as_deref();

    if request.response_type != "code" {
        return error_redirect(
            redirect,
            state,
            "unsupported_response_type",
            Some("response_type must be 'code'"),
        );
    }

    let challenge = match (
        request.code_challenge.as_deref(),
        request.code_challenge_method.as_deref(),
    ) {
        (Some(challenge), Some(METHOD_S256)) if is_well_formed_challenge(challenge) => challenge,
        _ => {
            return error_redirect(
                redirect,
                state,
                "invalid_request",
                Some("code_challenge with code_challenge_method=S256 is required"),
            );
        }
    };

    if let Some(resource) = request.resource.as_deref() {
        let valid = Url::parse(resource).is_ok_and(|u| u.fragment().is_none());
        if !valid {
            return error_redirect(
                redirect,
                state,
                "invalid_target",
                Some("resource must be an absolute URI without a fragment"),
            );
        }
    }

    if !is_valid_email(&request.username) || request.password.is_empty() {
        return error_redirect(
            redirect,
            state,
            "invalid_request",
            Some("a valid email and password are required"),
        );
    }

    let identity_id = match resources
        .token_endpoint
        .authenticate_password(&request.username.to_ascii_lowercase(), &request.password)
        .await
    {
        Ok(id) => id,
        Err(e) => return auth_error_redirect(redirect, state, e),
    };

    let pkce = PkceBinding::s256(challenge, request.resource.clone());
    match resources.codes.issue(&identity_id, Some(pkce)).await {
        Ok(code) => code_redirect(redirect, &code, state),
        Err(e) => auth_error_redirect(redirect, state, e),
    }
}

#[utoipa::path(
    get,
    path = "/authorize/{provider}",
    tag = AUTH_TAG,
    operation_id = "Provider Authorize",
    summary = "Start sign-in with an external provider",
    params(
        ("provider" = String, Path, description = "Configured provider name"),
        ProviderAuthorizeParams,
    ),
    responses(
        (status = 303, description = "Redirect to the provider's authorization endpoint"),
        (status = 400, description = "Unknown provider or untrusted redirect_uri", body = ErrorResponse),
    )
)]
#[tracing::instrument(skip(resources, params))]
pub async fn provider_authorize(
    State(resources): State<AppResources>,
    Path(provider): Path<String>,
    Query(params): Query<ProviderAuthorizeParams>,
) -> Response {
    let redirect = match trusted_redirect(&resources.config, params.redirect_uri.as_deref()) {
        Ok(url) => url,
        Err(response) => return response,
    };
    let Some(provider) = resources.config.provider(&provider) else {
        return AuthError::InvalidRequest(format!("unknown provider '{provider}'")).into_response();
    };

    match resources
        .relying_party
        .authorization_url(provider, redirect.as_str(), params.state.clone())
        .await
    {
        Ok(url) => Redirect::to(url.as_str()).into_response(),
        Err(e) => auth_error_redirect(redirect, params.state.as_deref(), e),
    }
}

#[utoipa::path(
    get,
    path = "/callback/{provider}",
    tag = AUTH_TAG,
    operation_id = "Provider Callback",
    summary = "Complete sign-in with an external provider",
    description = "Redeems the provider's code for an ID token, verifies it, finds or creates \
                   the identity and redirects to the client with one of our authorization codes.",
    params(
        ("provider" = String, Path, description = "Configured provider name"),
        CallbackParams,
    ),
    responses(
        (status = 303, description = "Redirect back to the client with `code` and `state`, or with `error`"),
        (status = 400, description = "Missing, forged or expired state", body = ErrorResponse),
    )
)]
#[tracing::instrument(skip(resources, params))]
pub async fn provider_callback(
    State(resources): State<AppResources>,
    Path(provider): Path<String>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let Some(signed_state) = params.state.as_deref() else {
        return AuthError::InvalidRequest("state is required".into()).into_response();
    };
    let flow = match resources.relying_party.open_state(&provider, signed_state) {
        Ok(flow) => flow,
        Err(e) => return e.into_response(),
    };
    let redirect = match trusted_redirect(&resources.config, Some(&flow.redirect_uri)) {
        Ok(url) => url,
        Err(response) => return response,
    };
    let state = flow.state.as_deref();

    if let Some(error) = params.error.as_deref() {
        tracing::info!(
            provider = %provider,
            error,
            description = params.error_description.as_deref().unwrap_or_default(),
            "provider returned an error"
        );
        return error_redirect(
            redirect,
            state,
            "access_denied",
            Some("the identity provider did not authorize the request"),
        );
    }
    let Some(code) = params.code.as_deref().filter(|c| !c.is_empty()) else {
        return error_redirect(redirect, state, "invalid_request", Some("code is required"));
    };
    let Some(provider) = resources.config.provider(&provider) else {
        return error_redirect(redirect, state, "invalid_request", Some("unknown provider"));
    };

    let result = async {
        let id_token = resources.relying_party.exchange_code(provider, code).await?;
        let identity_id = resources
            .token_endpoint
            .sign_in_with_id_token(&id_token)
            .await?;
        resources.codes.issue(&identity_id, None).await
    }
    .await;

    match result {
        Ok(code) => code_redirect(redirect, &code, state),
        Err(e) => auth_error_redirect(redirect, state, e),
    }
}

#[utoipa::path(
    get,
    path = "/providers",
    tag = AUTH_TAG,
    operation_id = "List Providers",
    summary = "Configured external identity providers",
    responses(
        (status = 200, description = "Providers and their sign-in URLs", body = ProvidersResponse),
    )
)]
pub async fn providers(State(resources): State<AppResources>) -> Json<ProvidersResponse> {
    let providers = resources
        .config
        .providers
        .iter()
        .map(|p| ProviderInfo {
            name: p.name.clone(),
            issuer: p.issuer_url.clone(),
            authorize_url: RelyingParty::authorize_path(&p.name),
            callback_url: resources.relying_party.callback_url(&p.name),
        })
        .collect();
    Json(ProvidersResponse {
        issuer: resources.config.issuer_url.clone(),
        providers,
    })
}

/// Parse `raw` and check it against the allow-list, or produce the JSON 400
/// to send instead of redirecting.
fn trusted_redirect(config: &AuthConfig, raw: Option<&str>) -> Result<Url, Response> {
    let reject = |description: &str| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("invalid_request", Some(description))),
        )
            .into_response()
    };
    let Some(raw) = raw.filter(|r| !r.is_empty()) else {
        return Err(reject("redirect_uri is required"));
    };
    let Ok(url) = Url::parse(raw) else {
        return Err(reject("redirect_uri is not a valid URL"));
    };
    if !config.is_redirect_allowed(raw) {
        tracing::info!(redirect_uri = raw, "redirect_uri not on the allow-list");
        return Err(reject("redirect_uri is not allowed"));
    }
    Ok(url)
}

fn code_redirect(mut redirect: Url, code: &str, state: Option<&str>) -> Response {
    {
        let mut query = redirect.query_pairs_mut();
        query.append_pair("code", code);
        if let Some(s) = state {
            query.append_pair("state", s);
        }
    }
    Redirect::to(redirect.as_str()).into_response()
}

fn error_redirect(
    mut redirect: Url,
    state: Option<&str>,
    error: &str,
    description: Option<&str>,
) -> Response {
    {
        let mut query = redirect.query_pairs_mut();
        query.append_pair("error", error);
        if let Some(desc) = description {
            query.append_pair("error_description", desc);
        }
        if let Some(s) = state {
            query.append_pair("state", s);
        }
    }
    Redirect::to(redirect.as_str()).into_response()
}

/// Map an internal failure onto the RFC 6749 §4.1.2.1 vocabulary.
fn auth_error_redirect(redirect: Url, state: Option<&str>, err: AuthError) -> Response {
    let code = match &err {
        AuthError::InvalidClient(_) | AuthError::AuthenticationFailed(_) => "access_denied",
        other => other.error_code(),
    };
    match &err {
        AuthError::Internal(detail) => {
            tracing::error!(error = %detail, "authorization flow failed");
        }
        other => tracing::debug!(error = %other, "authorization flow rejected"),
    }
    error_redirect(redirect, state, code, err.public_description().as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::LOCATION;

    fn location(response: &Response) -> Url {
        let raw = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap();
        Url::parse(raw).unwrap()
    }

    fn query(url: &Url, key: &str) -> Option<String> {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    #[test]
    fn error_redirect_appends_error_and_state() {
        let base = Url::parse("https://app.example.com/cb?keep=1").unwrap();
        let response = error_redirect(base, Some("xyz"), "invalid_request", Some("bad things"));
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let url = location(&response);
        assert_eq!(query(&url, "keep").as_deref(), Some("1"));
        assert_eq!(query(&url, "error").as_deref(), Some("invalid_request"));
        assert_eq!(query(&url, "error_description").as_deref(), Some("bad things"));
        assert_eq!(query(&url, "state").as_deref(), Some("xyz"));
    }

    #[test]
    fn internal_errors_redirect_without_description() {
        let base = Url::parse("https://app.example.com/cb").unwrap();
        let response = auth_error_redirect(base, None, AuthError::Internal("db down".into()));
        let url = location(&response);
        assert_eq!(query(&url, "error").as_deref(), Some("server_error"));
        assert!(query(&url, "error_description").is_none());
    }

    #[test]
    fn credential_failures_become_access_denied() {
        let base = Url::parse("https://app.example.com/cb").unwrap();
        let response = auth_error_redirect(
            base,
            Some("s"),
            AuthError::InvalidClient("invalid username or password".into()),
        );
        let url = location(&response);
        assert_eq!(query(&url, "error").as_deref(), Some("access_denied"));
    }
}
