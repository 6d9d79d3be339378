use color_eyre::eyre::WrapErr;
use oidc_token_service::AppResources;
use oidc_token_service::api::start_webserver;
use oidc_token_service::config::load_config;
use sea_orm::Database;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_tracing() {
    let default_directives = "oidc_token_service=info,hyper=warn,sea_orm=info";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_level(true))
        .init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();
    initialize_tracing();

    let config = load_config().wrap_err("Failed to load configuration")?;

    let db = Arc::new(
        Database::connect(&config.database_url)
            .await
            .wrap_err("Failed to connect to database")?,
    );

    let resources =
        AppResources::new(db, config.auth).wrap_err("Failed to initialise token services")?;

    start_webserver(resources, &config.listen_addr).await
}
