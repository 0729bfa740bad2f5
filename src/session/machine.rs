//! Per-connection protocol state machine.
//!
//! ```text
//! CONNECTING ──start──▶ AWAITING_HANDSHAKE ──HELLO ok──▶ READY
//!                            │        │                    │
//!                 timeout (5s)│        │HELLO rejected      │HELLO rejected / close
//!                            ▼        ▼                    ▼
//!                                   CLOSED
//! ```
//!
//! The machine never touches the socket. Replies go through the
//! [`SessionHandle`] outbound queue, and a terminal transition returns a
//! [`CloseReason`] telling the connection task to tear down.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;

use super::handle::SessionHandle;
use crate::directory::DeviceDirectory;
use crate::domain::{Channel, DeviceRecord};
use crate::mail::MailWatch;
use crate::protocol::{DeviceFrame, FrameError, ServerFrame};

/// Protocol states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport accepted, not yet started.
    Connecting,
    /// Waiting for `HELLO`.
    AwaitingHandshake,
    /// Handshake accepted; commands may flow.
    Ready,
    /// Terminal.
    Closed,
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Unknown callsign, malformed handshake, or callsign change.
    ProtocolViolation(String),
    /// No `HELLO` within the handshake window.
    HandshakeTimeout,
    /// Device told to reflash to this version.
    FirmwareUpdate(String),
    /// The mail-watch collaborator refused a mailbox.
    MailWatchFailed(String),
    /// Device directory unavailable during the handshake.
    DirectoryUnavailable(String),
    /// Peer closed the socket.
    PeerClosed,
    /// Socket read or write failed.
    Transport(String),
    /// Closed by the registry (reset or admin action).
    Evicted,
    /// Missed a liveness probe.
    Unresponsive,
}

impl CloseReason {
    /// Returns `true` for outcomes that indicate a fault rather than a
    /// normal lifecycle event.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(
            self,
            Self::ProtocolViolation(_)
                | Self::HandshakeTimeout
                | Self::MailWatchFailed(_)
                | Self::DirectoryUnavailable(_)
                | Self::Transport(_)
        )
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProtocolViolation(why) => write!(f, "protocol violation: {why}"),
            Self::HandshakeTimeout => f.write_str("handshake timeout"),
            Self::FirmwareUpdate(v) => write!(f, "firmware update to {v}"),
            Self::MailWatchFailed(why) => write!(f, "mail watch failed: {why}"),
            Self::DirectoryUnavailable(why) => write!(f, "directory unavailable: {why}"),
            Self::PeerClosed => f.write_str("peer closed"),
            Self::Transport(why) => write!(f, "transport error: {why}"),
            Self::Evicted => f.write_str("evicted"),
            Self::Unresponsive => f.write_str("unresponsive"),
        }
    }
}

/// Protocol state for one connection.
#[derive(Debug)]
pub struct Session {
    handle: Arc<SessionHandle>,
    state: SessionState,
    directory: Arc<dyn DeviceDirectory>,
    mail_watch: Arc<dyn MailWatch>,
}

impl Session {
    /// Creates a session in [`SessionState::Connecting`].
    #[must_use]
    pub fn new(
        handle: Arc<SessionHandle>,
        directory: Arc<dyn DeviceDirectory>,
        mail_watch: Arc<dyn MailWatch>,
    ) -> Self {
        Self {
            handle,
            state: SessionState::Connecting,
            directory,
            mail_watch,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Shared handle.
    #[must_use]
    pub fn handle(&self) -> &Arc<SessionHandle> {
        &self.handle
    }

    /// Opens the handshake window.
    pub fn start(&mut self) {
        if self.state == SessionState::Connecting {
            self.state = SessionState::AwaitingHandshake;
        }
    }

    /// Handshake window elapsed. Closes the session if no `HELLO` was
    /// accepted.
    pub fn handshake_timed_out(&mut self) -> Option<CloseReason> {
        if self.state != SessionState::AwaitingHandshake {
            return None;
        }
        tracing::info!(session_id = %self.handle.id(), "no handshake received");
        Some(self.reject(
            ServerFrame::Error("No handshake".to_string()),
            CloseReason::HandshakeTimeout,
        ))
    }

    /// Marks the session closed without sending anything.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }

    /// Handles one inbound text frame.
    ///
    /// Returns `Some` when the frame ended the session; any reply has
    /// already been queued ahead of the close.
    pub async fn handle_line(&mut self, line: &str) -> Option<CloseReason> {
        if matches!(self.state, SessionState::Closed | SessionState::Connecting) {
            return None;
        }
        match DeviceFrame::decode(line) {
            Ok(DeviceFrame::Hello { callsign, firmware }) => {
                self.on_hello(&callsign, firmware.as_deref()).await
            }
            Ok(DeviceFrame::Button) => {
                self.on_button().await;
                None
            }
            Ok(DeviceFrame::Unknown(raw)) => {
                tracing::debug!(session_id = %self.handle.id(), frame = %raw, "ignoring unknown frame");
                None
            }
            Err(FrameError::Empty) => None,
            Err(err) => Some(self.reject(
                ServerFrame::Error(err.to_string()),
                CloseReason::ProtocolViolation(err.to_string()),
            )),
        }
    }

    async fn on_hello(&mut self, callsign: &str, firmware: Option<&str>) -> Option<CloseReason> {
        let id = self.handle.id();
        if let Some(bound) = self.handle.callsign()
            && bound != callsign
        {
            tracing::warn!(session_id = %id, bound, callsign, "HELLO tried to change callsign");
            return Some(self.reject(
                ServerFrame::Error("callsign already set".to_string()),
                CloseReason::ProtocolViolation(format!("callsign change {bound} -> {callsign}")),
            ));
        }

        let device = match self.directory.lookup(callsign).await {
            Ok(Some(device)) => device,
            Ok(None) => {
                tracing::info!(session_id = %id, callsign, "unknown callsign");
                return Some(self.reject(
                    ServerFrame::Error("device not known".to_string()),
                    CloseReason::ProtocolViolation(format!("unknown callsign {callsign}")),
                ));
            }
            Err(err) => {
                tracing::error!(session_id = %id, callsign, error = %err, "directory lookup failed");
                self.handle.close();
                self.state = SessionState::Closed;
                return Some(CloseReason::DirectoryUnavailable(err.to_string()));
            }
        };

        if let Err(err) = self
            .directory
            .record_checkin(callsign, firmware, Utc::now())
            .await
        {
            tracing::warn!(session_id = %id, callsign, error = %err, "failed to record check-in");
        }

        if let Some(version) = device.expected_version.required_update(firmware) {
            tracing::info!(
                session_id = %id,
                callsign,
                firmware = firmware.unwrap_or("none"),
                expected = version,
                "firmware mismatch, requesting OTA"
            );
            let version = version.to_string();
            self.handle.send(ServerFrame::Ota(version.clone()));
            self.handle.close();
            self.state = SessionState::Closed;
            return Some(CloseReason::FirmwareUpdate(version));
        }

        let channels = match self.resolve_channels(&device).await {
            Ok(channels) => channels,
            Err(why) => {
                // No ERROR frame: the device should retry rather than halt.
                self.handle.close();
                self.state = SessionState::Closed;
                return Some(CloseReason::MailWatchFailed(why));
            }
        };

        self.handle.bind_callsign(callsign);
        let count = channels.len();
        self.handle.set_channels(channels);
        self.handle.send(ServerFrame::Welcome(id.to_string()));
        self.state = SessionState::Ready;
        tracing::info!(session_id = %id, callsign, channels = count, "handshake complete");
        None
    }

    async fn resolve_channels(&self, device: &DeviceRecord) -> Result<Vec<Channel>, String> {
        let mut channels = Vec::with_capacity(device.channels.len());
        for subscription in &device.channels {
            match self.directory.channel(&subscription.id).await {
                Ok(Some(channel)) => {
                    self.mail_watch
                        .watch(&channel.email)
                        .await
                        .map_err(|e| e.to_string())?;
                    channels.push(channel);
                }
                Ok(None) => tracing::warn!(
                    callsign = %device.callsign,
                    channel = %subscription.id,
                    "could not find channel"
                ),
                Err(err) => tracing::warn!(
                    callsign = %device.callsign,
                    channel = %subscription.id,
                    error = %err,
                    "channel lookup failed"
                ),
            }
        }
        Ok(channels)
    }

    async fn on_button(&self) {
        let Some(callsign) = self.handle.callsign() else {
            tracing::debug!(session_id = %self.handle.id(), "BUTTON before handshake");
            return;
        };
        tracing::info!(session_id = %self.handle.id(), callsign, "button pressed");
        if let Err(err) = self
            .directory
            .record_interaction(callsign, Utc::now())
            .await
        {
            tracing::warn!(callsign, error = %err, "failed to record interaction");
        }
    }

    fn reject(&mut self, frame: ServerFrame, reason: CloseReason) -> CloseReason {
        self.handle.send(frame);
        self.handle.close();
        self.state = SessionState::Closed;
        reason
    }
}
