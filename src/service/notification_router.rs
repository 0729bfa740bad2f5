//! Mail event fan-out.
//!
//! The router subscribes to the [`MailBus`] once and, for each
//! [`MailEvent`], queues the commands of every matching channel on every
//! live session. Delivery is per session and in channel order; a session
//! that has gone away simply drops its share.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::domain::{MailBus, MailEvent};
use crate::session::{ConnectionRegistry, SessionHandle};

/// Queues the commands bound to `mailbox` on each session.
///
/// Returns the number of frames queued.
pub fn fan_out(sessions: &[Arc<SessionHandle>], mailbox: &str) -> usize {
    let mut sent = 0;
    for handle in sessions {
        for command in handle.commands_for(mailbox) {
            if handle.send(&command) {
                sent += 1;
            } else {
                tracing::debug!(session_id = %handle.id(), "session gone, dropping command");
                break;
            }
        }
    }
    sent
}

/// Routes mail events to device sessions.
#[derive(Debug, Clone)]
pub struct NotificationRouter {
    registry: Arc<ConnectionRegistry>,
}

impl NotificationRouter {
    /// Creates a router delivering through `registry`.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Delivers one event. Returns the number of frames queued.
    pub async fn route(&self, event: &MailEvent) -> usize {
        let sent = self.registry.notify_devices(&event.mailbox).await;
        tracing::info!(mailbox = %event.mailbox, frames = sent, "routed mail event");
        sent
    }

    /// Consumes events until the bus closes.
    pub async fn run(self, mut rx: broadcast::Receiver<MailEvent>) {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    self.route(&event).await;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "notification router lagged behind mail bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        tracing::debug!("notification router stopped");
    }

    /// Subscribes to `bus` and runs the router on a background task.
    pub fn spawn(self, bus: &MailBus) -> JoinHandle<()> {
        let rx = bus.subscribe();
        tokio::spawn(self.run(rx))
    }
}
