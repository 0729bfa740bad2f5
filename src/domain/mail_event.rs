//! Mail-watch events consumed by the notification router.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// "Mailbox M received new mail."
///
/// Upstream de-duplicates to one event per mail-history delta, not one per
/// message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailEvent {
    /// Mailbox address that received mail.
    pub mailbox: String,
    /// When the delta was observed.
    pub timestamp: DateTime<Utc>,
}

impl MailEvent {
    /// Creates an event for `mailbox` stamped with the current time.
    #[must_use]
    pub fn new(mailbox: impl Into<String>) -> Self {
        Self {
            mailbox: mailbox.into(),
            timestamp: Utc::now(),
        }
    }
}
