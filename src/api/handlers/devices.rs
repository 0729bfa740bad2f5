//! Device admin handlers: list, test, disconnect-all.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{ConnectedDevicesResponse, DisconnectAllResponse, TestDeviceResponse};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, GatewayError};
use crate::session::test_frames;

/// `GET /devices/connected`: list live sessions.
#[utoipa::path(
    get,
    path = "/api/v1/devices/connected",
    tag = "Devices",
    summary = "List connected devices",
    responses(
        (status = 200, description = "Live sessions", body = ConnectedDevicesResponse),
    )
)]
pub async fn connected_devices(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.registry.list().await;
    Json(ConnectedDevicesResponse {
        count: sessions.len(),
        sessions,
    })
}

/// `POST /devices/{callsign}/test`: push the test sequence to a device.
///
/// # Errors
///
/// Returns [`GatewayError::DeviceNotFound`] if the directory does not know
/// the callsign, or [`GatewayError::Directory`] if the lookup fails.
#[utoipa::path(
    post,
    path = "/api/v1/devices/{callsign}/test",
    tag = "Devices",
    summary = "Send test sequence",
    description = "Plays a scale on speaker 1 and lights LED 1 for five seconds on every session of the device. Succeeds with zero sessions when the device is known but offline.",
    params(("callsign" = String, Path, description = "Device callsign")),
    responses(
        (status = 200, description = "Test sequence queued", body = TestDeviceResponse),
        (status = 404, description = "Unknown device", body = ErrorResponse),
        (status = 502, description = "Directory unavailable", body = ErrorResponse),
    )
)]
pub async fn test_device(
    State(state): State<AppState>,
    Path(callsign): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    if state.directory.lookup(&callsign).await?.is_none() {
        return Err(GatewayError::DeviceNotFound(callsign));
    }
    let sessions = state.registry.test_device(&callsign).await;
    Ok(Json(TestDeviceResponse {
        callsign,
        sessions,
        frames: test_frames().iter().map(ToString::to_string).collect(),
    }))
}

/// `POST /devices/disconnect-all`: close every session.
#[utoipa::path(
    post,
    path = "/api/v1/devices/disconnect-all",
    tag = "Devices",
    summary = "Disconnect all devices",
    responses(
        (status = 200, description = "Sessions closed", body = DisconnectAllResponse),
    )
)]
pub async fn disconnect_all(State(state): State<AppState>) -> impl IntoResponse {
    let disconnected = state.registry.reset().await;
    Json(DisconnectAllResponse { disconnected })
}

/// Device routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/devices/connected", get(connected_devices))
        .route("/devices/{callsign}/test", post(test_device))
        .route("/devices/disconnect-all", post(disconnect_all))
}
