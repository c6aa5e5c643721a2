//! ecodeli-server: EcoDeli marketplace backend
//!
//! Long-running service that:
//! - Publishes delivery announcements and matches them with deliverers
//! - Tracks deliveries and closes them with the client's handover code
//! - Holds payments in escrow through Stripe and pays out to wallets
//! - Rents storage boxes and books provider services
//! - Runs background jobs (escrow auto-release, document expiry, reservations)

mod api;
mod auth;
mod config;
mod db;
mod error;
mod jobs;
mod live;
mod services;
mod state;
mod stripe;
mod util;

use std::net::SocketAddr;
use std::time::Duration;

use config::Config;
use state::AppState;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load .env file
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ecodeli_server=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;

    tracing::info!("Starting ecodeli-server (env: {})", config.environment);

    // Initialize application state
    let state = AppState::new(&config).await?;

    // Background jobs
    let jobs = jobs::spawn(
        state.clone(),
        Duration::from_secs(config.job_interval_secs.max(1)),
    );

    let app = api::create_router(state, config.cors_allowed_origin.as_deref());

    let http_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&http_addr).await?;
    tracing::info!("ecodeli-server HTTP listening on {http_addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    jobs.abort();
    tracing::info!("ecodeli-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
