//! Server assembly: router, background tasks, listener.
//!
//! `main` and the integration tests share these so the tests boot the
//! exact router the binary serves.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::app_state::AppState;
use crate::config::{DirectoryBackend, GatewayConfig};
use crate::directory::{DeviceDirectory, MemoryDirectory, PostgresDirectory};
use crate::error::DirectoryError;
use crate::service::NotificationRouter;
use crate::ws::handler::ws_handler;

/// Upper bound for producing an HTTP response. Upgraded sockets are not
/// affected once the `101` has been sent.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds the HTTP + WebSocket router.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(api::build_router())
        .route("/ws", get(ws_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    REQUEST_TIMEOUT,
                )),
        )
        .with_state(state)
}

/// Opens the directory backend selected by `config`.
///
/// # Errors
///
/// Returns [`DirectoryError`] if the seed file cannot be loaded or the
/// database is unreachable.
pub async fn open_directory(
    config: &GatewayConfig,
) -> Result<Arc<dyn DeviceDirectory>, DirectoryError> {
    match config.directory_backend {
        DirectoryBackend::Memory => {
            let directory = match &config.directory_seed_file {
                Some(path) => MemoryDirectory::load(path).await?,
                None => {
                    tracing::warn!("no DIRECTORY_SEED_FILE set, every device will be unknown");
                    MemoryDirectory::new()
                }
            };
            Ok(Arc::new(directory))
        }
        DirectoryBackend::Postgres => {
            let directory = PostgresDirectory::connect(
                &config.database_url,
                config.database_max_connections,
                config.database_connect_timeout,
            )
            .await?;
            Ok(Arc::new(directory))
        }
    }
}

/// Handles to the gateway's long-running tasks. Aborted on drop.
#[derive(Debug)]
pub struct BackgroundTasks {
    sweep: JoinHandle<()>,
    router: JoinHandle<()>,
}

impl BackgroundTasks {
    /// Starts the liveness sweep and the notification router.
    #[must_use]
    pub fn spawn(state: &AppState, sweep_interval: Duration) -> Self {
        let sweep = state.registry.spawn_liveness_sweep(sweep_interval);
        let router = NotificationRouter::new(Arc::clone(&state.registry))
            .spawn(state.mail_watch.bus());
        Self { sweep, router }
    }
}

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        self.sweep.abort();
        self.router.abort();
    }
}

/// Serves `app` on `listener` with peer addresses available to handlers.
///
/// # Errors
///
/// Returns an I/O error if the server fails.
pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}
