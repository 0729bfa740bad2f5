//! Shared application state injected into all Axum handlers.

use std::sync::Arc;
use std::time::Duration;

use crate::directory::DeviceDirectory;
use crate::mail::MailWatchHub;
use crate::session::ConnectionRegistry;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Live device sessions.
    pub registry: Arc<ConnectionRegistry>,
    /// Device and channel lookups.
    pub directory: Arc<dyn DeviceDirectory>,
    /// Watched mailboxes and push intake.
    pub mail_watch: Arc<MailWatchHub>,
    /// How long a new connection may wait before sending `HELLO`.
    pub handshake_timeout: Duration,
}

impl AppState {
    /// Bundles the shared components.
    #[must_use]
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        directory: Arc<dyn DeviceDirectory>,
        mail_watch: Arc<MailWatchHub>,
        handshake_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            directory,
            mail_watch,
            handshake_timeout,
        }
    }
}
