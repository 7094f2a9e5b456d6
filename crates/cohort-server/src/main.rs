use anyhow::Result;
use axum::http::HeaderValue;
use clap::Parser;
use cohort_core::{AppState, CoreConfig};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("cohort=info,tower_http=debug")),
        )
        .init();

    let args = cli::Args::parse();
    let config = config::Config::load(&args.config)?;

    ensure_data_dir(&config.database.url);

    let pool =
        cohort_db::create_pool(&config.database.url, config.database.max_connections).await?;
    cohort_db::run_migrations(&pool).await?;

    let state = AppState::new(
        pool,
        CoreConfig {
            jwt_secret: config.auth.jwt_secret.clone(),
            jwt_expiry_seconds: config.auth.jwt_expiry_seconds,
            worker_id: config.gateway.worker_id,
        },
    );

    let cors = match &config.server.public_url {
        Some(url) => match url.parse::<HeaderValue>() {
            Ok(origin) => CorsLayer::new()
                .allow_origin(origin)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
            Err(_) => {
                tracing::warn!("invalid public_url '{}', allowing any origin", url);
                CorsLayer::permissive()
            }
        },
        None => CorsLayer::permissive(),
    };

    let app = cohort_ws::gateway_router()
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!("gateway listening on {}", config.server.bind_address);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("gateway shut down");
    Ok(())
}

/// For on-disk SQLite URLs, creates the parent directory so the first
/// run does not fail on open.
fn ensure_data_dir(database_url: &str) {
    let Some(path) = database_url
        .strip_prefix("sqlite://")
        .map(|rest| rest.split('?').next().unwrap_or(rest))
    else {
        return;
    };
    if path.starts_with(':') {
        return;
    }
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                tracing::warn!("could not create data directory {:?}: {err}", parent);
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {err}");
        return;
    }
    tracing::info!("shutdown signal received");
}
