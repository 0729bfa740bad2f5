//! In-process hand-off from mail intake to device fan-out.
//!
//! The mail-watch hub announces "mailbox M has new mail" on the [`MailBus`];
//! the notification router is its only subscriber and turns each event
//! into device commands. Nothing is persisted: an event announced while no
//! router is listening is lost, the same way a device that is offline
//! misses its notification.

use tokio::sync::broadcast;

use super::MailEvent;

/// Typed channel carrying [`MailEvent`]s from the hub to the router.
///
/// Up to `capacity` events queue for a slow router. Past that the oldest
/// are discarded and the router sees a `Lagged` count on its next receive,
/// so a burst of mail costs some notifications rather than stalling the
/// push endpoint.
#[derive(Debug, Clone)]
pub struct MailBus {
    sender: broadcast::Sender<MailEvent>,
}

impl MailBus {
    /// Creates a bus queueing at most `capacity` undelivered events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Announces new mail for `mailbox`.
    ///
    /// Returns how many subscribers will see the event; `0` means no
    /// router is running and the notification is dropped.
    pub fn announce(&self, mailbox: &str) -> usize {
        match self.sender.send(MailEvent::new(mailbox)) {
            Ok(subscribers) => subscribers,
            Err(_) => {
                tracing::warn!(%mailbox, "no notification router listening, mail event dropped");
                0
            }
        }
    }

    /// Subscribes to events announced from now on. The router calls this
    /// once at startup.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<MailEvent> {
        self.sender.subscribe()
    }

    /// Whether anything is listening for mail events.
    #[must_use]
    pub fn is_routed(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}
