//! # pgw-api: Binary Entry Point
//!
//! Loads the partner table from `PARTNERS_CONFIG`, connects to Postgres
//! when `DATABASE_URL` is set, and serves the gateway on `PORT`
//! (default 8080).

use pgw_api::bootstrap::PartnerTable;
use pgw_api::state::AppConfig;
use pgw_webhook::DispatcherConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = AppConfig::from_env();
    let port = config.port;

    let table = PartnerTable::from_env().map_err(|e| {
        tracing::error!("partner table rejected: {e}");
        e
    })?;
    let dispatcher_config = DispatcherConfig::from_env().map_err(|e| {
        tracing::error!("webhook dispatcher configuration invalid: {e}");
        e
    })?;

    // Optional: absent DATABASE_URL means in-memory stores.
    let db_pool = pgw_api::db::init_pool().await.map_err(|e| {
        tracing::error!("database initialization failed: {e}");
        e
    })?;

    let state = pgw_api::bootstrap::bootstrap(table, config, dispatcher_config, db_pool)
        .map_err(|e| {
            tracing::error!("bootstrap failed: {e}");
            e
        })?;

    let app = pgw_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("partner gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

/// `RUST_LOG` filter (default `info`); JSON lines when `PGW_LOG_FORMAT=json`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("PGW_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
