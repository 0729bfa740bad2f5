//! Device admin DTOs.

use serde::Serialize;
use utoipa::ToSchema;

use crate::session::SessionStatus;

/// Response body for `GET /devices/connected`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ConnectedDevicesResponse {
    /// Number of live sessions.
    pub count: usize,
    /// One entry per live session, oldest first.
    pub sessions: Vec<SessionStatus>,
}

/// Response body for `POST /devices/{callsign}/test`.
#[derive(Debug, Serialize, ToSchema)]
pub struct TestDeviceResponse {
    /// Callsign the test was addressed to.
    pub callsign: String,
    /// Sessions that received the test sequence.
    pub sessions: usize,
    /// Frames sent to each session.
    pub frames: Vec<String>,
}

/// Response body for `POST /devices/disconnect-all`.
#[derive(Debug, Serialize, ToSchema)]
pub struct DisconnectAllResponse {
    /// Sessions that were closed.
    pub disconnected: usize,
}
