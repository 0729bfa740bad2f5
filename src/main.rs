//! notifier-gateway server entry point.
//!
//! Starts the Axum HTTP server with the device WebSocket endpoint, the
//! admin REST API and the mail push intake.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use notifier_gateway::app_state::AppState;
use notifier_gateway::config::GatewayConfig;
use notifier_gateway::domain::MailBus;
use notifier_gateway::mail::MailWatchHub;
use notifier_gateway::server::{self, BackgroundTasks};
use notifier_gateway::session::ConnectionRegistry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = GatewayConfig::from_env()?;
    tracing::info!(
        addr = %config.listen_addr,
        backend = ?config.directory_backend,
        "starting notifier-gateway"
    );

    let directory = server::open_directory(&config).await?;
    let mail_watch = Arc::new(MailWatchHub::new(MailBus::new(config.mail_bus_capacity)));
    let registry = Arc::new(ConnectionRegistry::new());

    let app_state = AppState::new(registry, directory, mail_watch, config.handshake_timeout);
    let _tasks = BackgroundTasks::spawn(&app_state, config.sweep_interval);

    let app = server::build_app(app_state);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    server::serve(listener, app).await?;

    Ok(())
}
