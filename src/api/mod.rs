//! REST API layer: route handlers, DTOs, and router composition.
//!
//! Admin and mail endpoints are mounted under `/api/v1`; health and the
//! device keepalive sit at the root.

pub mod dto;
pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI document for the REST surface.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "notifier-gateway"),
    paths(
        handlers::system::health_handler,
        handlers::system::keepalive_handler,
        handlers::devices::connected_devices,
        handlers::devices::test_device,
        handlers::devices::disconnect_all,
        handlers::mail::notify,
        handlers::mail::watched,
    ),
    tags(
        (name = "System", description = "Health and keepalive"),
        (name = "Devices", description = "Connected device administration"),
        (name = "Mail", description = "Mail push intake"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes());
    with_docs(router)
}

#[cfg(feature = "swagger-ui")]
fn with_docs(router: Router<AppState>) -> Router<AppState> {
    use utoipa_swagger_ui::SwaggerUi;
    router.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

#[cfg(not(feature = "swagger-ui"))]
fn with_docs(router: Router<AppState>) -> Router<AppState> {
    router
}
