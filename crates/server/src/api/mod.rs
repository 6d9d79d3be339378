//! HTTP surface.
//!
//! - `auth` endpoints under `/auth` (token, revoke, authorize, callback,
//!   providers, userinfo)
//! - `/healthz`
//! - `/api-docs` rendered from the utoipa document

pub mod authorize;
pub mod extract;
pub mod health;
pub mod openapi;
pub mod token;
pub mod userinfo;

use crate::AppResources;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_redoc::{Redoc, Servable};

pub const MISC_TAG: &str = "Miscellaneous";
pub const AUTH_TAG: &str = "Auth";

fn auth_router() -> OpenApiRouter<AppResources> {
    OpenApiRouter::new()
        .routes(routes!(token::token))
        .routes(routes!(token::revoke))
        .routes(routes!(authorize::native_authorize))
        .routes(routes!(authorize::provider_authorize))
        .routes(routes!(authorize::provider_callback))
        .routes(routes!(authorize::providers))
        .routes(routes!(userinfo::userinfo))
}

/// The complete application router, without a listener.
pub fn app(resources: AppResources) -> axum::Router {
    let (router, api) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .nest("/auth", auth_router())
        .routes(routes!(health::health))
        .with_state(resources)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .split_for_parts();

    router
        .merge(Redoc::with_url("/api-docs", api))
        .method_not_allowed_fallback(token::method_not_allowed)
}

#[tracing::instrument(skip(resources))]
pub async fn start_webserver(resources: AppResources, listen_addr: &str) -> color_eyre::Result<()> {
    let router = app(resources);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(addr = listen_addr, "server listening");
    axum::serve(listener, router.into_make_service())
        .await
        .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}
