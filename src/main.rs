use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use tokio::signal;
use tracing::info;

mod api;
mod catalog;
mod config;
mod error;
mod prompt;
mod provider;
mod relay;

pub use config::Config;
pub use error::AskError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // When invoked as a Docker HEALTHCHECK, hit /healthz and exit immediately.
    // This avoids needing any external tool (curl/wget) in the container image.
    if std::env::args().nth(1).as_deref() == Some("--healthcheck") {
        return healthcheck().await;
    }

    // Initialise tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "catalog_qa=info,tower_http=warn".into()),
        )
        .init();

    // Load config
    let config_path = std::env::var("CATALOG_QA_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!(
        port = config.server.port,
        provider = %config.provider.base_url,
        mode = %config.provider.mode,
        "catalog-qa starting"
    );

    // The catalog is loaded once and read-only for the lifetime of the
    // process; a load failure here is a deployment defect, not a per-request
    // condition.
    let catalog = catalog::Catalog::load(&config.catalog.movies_path, &config.catalog.films_path)
        .context("Failed to load catalog source files")?;

    let config = Arc::new(config);
    let state = Arc::new(api::ask::AppState {
        config: Arc::clone(&config),
        catalog: Arc::new(catalog),
    });

    let addr: SocketAddr = format!("0.0.0.0:{}", config.server.port).parse()?;
    info!(%addr, "API listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let trace_layer = tower_http::trace::TraceLayer::new_for_http()
        .make_span_with(tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO))
        .on_response(tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO));

    let app = api::ask::router(state)
        .layer(axum::middleware::from_fn(api::request_id::request_id_middleware))
        .layer(trace_layer);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result.context("API server error")?;
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Lightweight healthcheck: GET /healthz and exit 0 on 200, 1 otherwise.
/// Invoked via `catalog-qa --healthcheck` from Docker HEALTHCHECK.
async fn healthcheck() -> anyhow::Result<()> {
    let port = std::env::var("CATALOG_QA_PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(8080);

    let url = format!("http://127.0.0.1:{port}/healthz");
    let resp = reqwest::get(&url).await?;

    if resp.status().is_success() {
        std::process::exit(0);
    } else {
        std::process::exit(1);
    }
}
