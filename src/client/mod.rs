//! Device-side client.
//!
//! The device half of the protocol: it connects to the gateway, names
//! itself with `HELLO`, drives an LED and a speaker from the frames it
//! receives, and reconnects after a fixed delay whenever the link drops.
//!
//! - [`Client`]: the reconnecting event loop.
//! - [`ClientHandle`]: button, mute and stop controls for a running client.
//! - [`Panel`]: the LED + speaker state machine.
//! - [`Dialer`] / [`Link`]: the transport seam; [`WsDialer`] is the real one.

pub mod panel;
pub mod reconnector;
pub mod timer;
pub mod transport;

use std::time::Duration;

use tokio::sync::mpsc;

pub use panel::{Indicator, Panel};
pub use reconnector::{Client, ClientExit};
pub use timer::ScheduledTask;
pub use transport::{Dialer, Link, WsDialer, WsLink};

/// Client-side failures. All of them except [`ClientError::Rejected`]
/// lead to a retry.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The server URL has an unsupported scheme.
    #[error("unsupported server url: {0}")]
    InvalidUrl(String),

    /// The keepalive pre-flight failed.
    #[error("keepalive failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The WebSocket failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// No `WELCOME` arrived in time.
    #[error("no WELCOME within {0:?}")]
    WelcomeTimeout(Duration),

    /// The server closed the link during the handshake.
    #[error("connection closed during handshake")]
    Closed,

    /// The server asked for a firmware update.
    #[error("server requested firmware {0}")]
    FirmwareUpdate(String),

    /// The server rejected the device with `ERROR`.
    #[error("rejected by server: {0}")]
    Rejected(String),
}

/// Client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Callsign sent in `HELLO`.
    pub callsign: String,
    /// Firmware hash sent in `HELLO`.
    pub firmware: Option<String>,
    /// Delay between a lost connection and the next attempt.
    pub retry_delay: Duration,
    /// How long to wait for `WELCOME` after `HELLO`.
    pub welcome_timeout: Duration,
    /// Start with local audio muted.
    pub muted: bool,
}

impl ClientConfig {
    /// Settings with the default 3s retry and 10s welcome timeout.
    #[must_use]
    pub fn new(callsign: impl Into<String>) -> Self {
        Self {
            callsign: callsign.into(),
            firmware: None,
            retry_delay: Duration::from_secs(3),
            welcome_timeout: Duration::from_secs(10),
            muted: true,
        }
    }
}

/// Commands accepted by a running [`Client`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCommand {
    /// Local button press.
    Press,
    /// Mute or unmute local audio.
    Mute(bool),
    /// Disconnect and stop retrying.
    Stop,
}

/// Control handle for a running [`Client`].
#[derive(Debug, Clone)]
pub struct ClientHandle {
    tx: mpsc::UnboundedSender<ClientCommand>,
}

impl ClientHandle {
    /// Presses the button.
    pub fn press(&self) -> bool {
        self.tx.send(ClientCommand::Press).is_ok()
    }

    /// Mutes or unmutes local audio.
    pub fn mute(&self, muted: bool) -> bool {
        self.tx.send(ClientCommand::Mute(muted)).is_ok()
    }

    /// Stops the client. Returns `false` if it had already exited.
    pub fn stop(&self) -> bool {
        self.tx.send(ClientCommand::Stop).is_ok()
    }
}
